//! A small fully connected autoencoder, trained to reconstruct scaled
//! intensity profiles
//!
//! Two encoder layers compress every sample into `latent_dim` values and two
//! decoder layers expand it back:
//!
//! ```text
//! e1: features -> latent, LeakyReLU
//! e2: latent   -> latent, CELU
//! d1: latent   -> latent, LeakyReLU
//! d2: latent   -> features, CELU
//! ```
//!
//! Gradients of the mean squared reconstruction error are computed by hand
//! and parameters are updated with Adam (Kingma & Ba, 2014).

use super::matrix::Matrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub latent_dim: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of (shuffled) samples used for training, the rest is held out
    pub train_fraction: f64,
    pub seed: u64,
}

/// Consumers of randomness during training, each drawing from its own stream
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RngStream {
    /// Sample shuffle before the train/held-out split
    Split,
    /// Weight initialization
    Init,
    /// Mini-batch order within each epoch
    Epochs,
}

impl TrainingSettings {
    /// Seeded generator for `stream`, derived from `seed`
    pub fn rng(&self, stream: RngStream) -> StdRng {
        let offset = match stream {
            RngStream::Split => 0,
            RngStream::Init => 1,
            RngStream::Epochs => 2,
        };
        StdRng::seed_from_u64(self.seed.wrapping_add(offset))
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            latent_dim: 100,
            epochs: 200,
            batch_size: 128,
            learning_rate: 1E-3,
            train_fraction: 0.7,
            seed: 42,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Activation {
    /// Negative slope
    LeakyRelu(f64),
    /// Alpha
    Celu(f64),
}

impl Activation {
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::LeakyRelu(_) | Activation::Celu(_) if z > 0.0 => z,
            Activation::LeakyRelu(slope) => slope * z,
            Activation::Celu(alpha) => alpha * ((z / alpha).exp() - 1.0),
        }
    }

    /// Derivative with respect to the pre-activation `z`
    pub fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::LeakyRelu(_) | Activation::Celu(_) if z > 0.0 => 1.0,
            Activation::LeakyRelu(slope) => slope,
            Activation::Celu(alpha) => (z / alpha).exp(),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::LeakyRelu(slope) => write!(f, "LeakyReLU(negative_slope={})", slope),
            Activation::Celu(alpha) => write!(f, "CELU(alpha={:.1})", alpha),
        }
    }
}

/// Affine map followed by an element-wise activation
#[derive(Clone, Debug, PartialEq)]
pub struct Linear {
    /// inputs x outputs
    pub weight: Matrix,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

impl Linear {
    /// Initialize weights and biases uniformly in ±1/sqrt(inputs)
    pub fn new<R: Rng>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        let bound = 1.0 / (inputs.max(1) as f64).sqrt();
        let mut sample = |n: usize| {
            (0..n)
                .map(|_| rng.gen_range(-bound..bound))
                .collect::<Vec<f64>>()
        };
        let weight = Matrix::new(sample(inputs * outputs), inputs, outputs);
        let bias = sample(outputs);
        Linear {
            weight,
            bias,
            activation,
        }
    }

    pub fn inputs(&self) -> usize {
        self.weight.rows
    }

    pub fn outputs(&self) -> usize {
        self.weight.cols
    }

    pub fn parameter_count(&self) -> usize {
        self.weight.rows * self.weight.cols + self.bias.len()
    }

    fn affine(&self, x: &Matrix) -> Matrix {
        let mut z = x.dot(&self.weight);
        z.add_row(&self.bias);
        z
    }

    pub fn forward(&self, x: &Matrix) -> Matrix {
        let activation = self.activation;
        self.affine(x).map(|z| activation.apply(z))
    }
}

/// Gradient of the loss with respect to the parameters of one [`Linear`] layer
#[derive(Clone, Debug)]
pub struct Gradient {
    pub weight: Matrix,
    pub bias: Vec<f64>,
}

const LAYER_NAMES: [&str; 4] = ["e1", "e2", "d1", "d2"];

#[derive(Clone, Debug, PartialEq)]
pub struct Autoencoder {
    /// `e1`, `e2`, `d1`, `d2`
    pub layers: [Linear; 4],
}

/// Layer inputs and pre-activations recorded during a forward pass
struct Trace {
    inputs: Vec<Matrix>,
    pre: Vec<Matrix>,
    output: Matrix,
}

impl Autoencoder {
    pub fn new<R: Rng>(features: usize, latent_dim: usize, rng: &mut R) -> Self {
        let leaky = Activation::LeakyRelu(0.01);
        let celu = Activation::Celu(1.0);
        Autoencoder {
            layers: [
                Linear::new(features, latent_dim, leaky, rng),
                Linear::new(latent_dim, latent_dim, celu, rng),
                Linear::new(latent_dim, latent_dim, leaky, rng),
                Linear::new(latent_dim, features, celu, rng),
            ],
        }
    }

    pub fn features(&self) -> usize {
        self.layers[0].inputs()
    }

    pub fn latent_dim(&self) -> usize {
        self.layers[0].outputs()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Linear::parameter_count).sum()
    }

    /// Map samples x features into samples x latent
    pub fn encode(&self, x: &Matrix) -> Matrix {
        let hidden = self.layers[0].forward(x);
        self.layers[1].forward(&hidden)
    }

    /// Map samples x latent back into samples x features
    pub fn decode(&self, encoded: &Matrix) -> Matrix {
        let hidden = self.layers[2].forward(encoded);
        self.layers[3].forward(&hidden)
    }

    pub fn forward(&self, x: &Matrix) -> Matrix {
        self.decode(&self.encode(x))
    }

    fn trace(&self, x: &Matrix) -> Trace {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre = Vec::with_capacity(self.layers.len());
        let mut h = x.clone();
        for layer in &self.layers {
            let z = layer.affine(&h);
            let activation = layer.activation;
            let next = z.map(|v| activation.apply(v));
            inputs.push(h);
            pre.push(z);
            h = next;
        }
        Trace {
            inputs,
            pre,
            output: h,
        }
    }

    /// Reconstruction loss of `x` and its gradient for every layer
    pub fn backprop(&self, x: &Matrix) -> (f64, Vec<Gradient>) {
        let trace = self.trace(x);
        let loss = mse(&trace.output, x);

        let n = (x.rows * x.cols) as f64;
        let mut upstream = trace.output.zip_map(x, |y, t| 2.0 * (y - t) / n);
        let mut grads = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let activation = layer.activation;
            let dz = upstream.zip_map(&trace.pre[i], |g, z| g * activation.derivative(z));
            if i > 0 {
                upstream = dz.dot(&layer.weight.transpose());
            }
            grads.push(Gradient {
                weight: trace.inputs[i].transpose().dot(&dz),
                bias: dz.col_sums(),
            });
        }
        grads.reverse();
        (loss, grads)
    }
}

impl fmt::Display for Autoencoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Autoencoder(")?;
        for (name, layer) in LAYER_NAMES.iter().zip(&self.layers) {
            writeln!(
                f,
                "  ({}): Linear(in_features={}, out_features={}, bias=True), {}",
                name,
                layer.inputs(),
                layer.outputs(),
                layer.activation
            )?;
        }
        write!(f, ")")
    }
}

/// Mean squared error over every element
pub fn mse(prediction: &Matrix, target: &Matrix) -> f64 {
    let n = (target.rows * target.cols) as f64;
    prediction
        .as_slice()
        .iter()
        .zip(target.as_slice())
        .map(|(y, t)| (y - t).powi(2))
        .sum::<f64>()
        / n
}

#[derive(Clone, Debug, Default)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
}

/// Adam optimizer with bias-corrected moment estimates
#[derive(Clone, Debug)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    steps: i32,
    moments: Vec<Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1E-8,
            steps: 0,
            moments: Vec::new(),
        }
    }

    pub fn step(&mut self, model: &mut Autoencoder, grads: &[Gradient]) {
        if self.moments.is_empty() {
            self.moments = model
                .layers
                .iter()
                .flat_map(|l| [l.weight.rows * l.weight.cols, l.bias.len()])
                .map(|n| Moments {
                    m: vec![0.0; n],
                    v: vec![0.0; n],
                })
                .collect();
        }
        self.steps += 1;

        let Adam {
            learning_rate,
            beta1,
            beta2,
            eps,
            steps,
            ..
        } = *self;
        let step_size = learning_rate / (1.0 - beta1.powi(steps));
        let correction = (1.0 - beta2.powi(steps)).sqrt();

        let params = model
            .layers
            .iter_mut()
            .flat_map(|l| [l.weight.as_mut_slice(), l.bias.as_mut_slice()]);
        let grads = grads
            .iter()
            .flat_map(|g| [g.weight.as_slice(), g.bias.as_slice()]);

        for ((param, grad), state) in params.zip(grads).zip(self.moments.iter_mut()) {
            for i in 0..param.len() {
                let g = grad[i];
                state.m[i] = beta1 * state.m[i] + (1.0 - beta1) * g;
                state.v[i] = beta2 * state.v[i] + (1.0 - beta2) * g * g;
                param[i] -= step_size * state.m[i] / (state.v[i].sqrt() / correction + eps);
            }
        }
    }
}

/// Mean training and held-out reconstruction loss of one epoch
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct EpochLoss {
    /// 1-based
    pub epoch: usize,
    pub epochs: usize,
    pub loss: f64,
    pub test_loss: f64,
}

impl fmt::Display for EpochLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch : {}/{}, loss = {:.6}, test_loss = {:.6}",
            self.epoch, self.epochs, self.loss, self.test_loss
        )
    }
}

/// Mean of the per-batch reconstruction loss, `NaN` for an empty matrix
pub fn evaluate(model: &Autoencoder, x: &Matrix, batch_size: usize) -> f64 {
    let rows = (0..x.rows).collect::<Vec<_>>();
    let losses = rows
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let batch = x.select_rows(chunk);
            mse(&model.forward(&batch), &batch)
        })
        .collect::<Vec<_>>();
    losses.iter().sum::<f64>() / losses.len() as f64
}

pub struct Trainer {
    epochs: usize,
    batch_size: usize,
    optimizer: Adam,
    rng: StdRng,
}

impl Trainer {
    pub fn new(settings: &TrainingSettings) -> Self {
        Trainer {
            epochs: settings.epochs,
            batch_size: settings.batch_size.max(1),
            optimizer: Adam::new(settings.learning_rate),
            rng: settings.rng(RngStream::Epochs),
        }
    }

    /// Train `model` on the rows of `train`, reshuffling mini-batches every
    /// epoch. `on_epoch` is called after each epoch with the mean losses
    pub fn fit<F>(
        &mut self,
        model: &mut Autoencoder,
        train: &Matrix,
        test: &Matrix,
        mut on_epoch: F,
    ) -> Vec<EpochLoss>
    where
        F: FnMut(&EpochLoss),
    {
        let mut order = (0..train.rows).collect::<Vec<_>>();
        let mut history = Vec::with_capacity(self.epochs);
        for epoch in 0..self.epochs {
            order.shuffle(&mut self.rng);

            let mut total = 0.0;
            let mut batches = 0;
            for chunk in order.chunks(self.batch_size) {
                let batch = train.select_rows(chunk);
                let (loss, grads) = model.backprop(&batch);
                self.optimizer.step(model, &grads);
                total += loss;
                batches += 1;
            }

            let loss = EpochLoss {
                epoch: epoch + 1,
                epochs: self.epochs,
                loss: total / batches as f64,
                test_loss: evaluate(model, test, self.batch_size),
            };
            on_epoch(&loss);
            history.push(loss);
        }
        history
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Matrix {
        let data = (0..rows * cols)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect::<Vec<f64>>();
        Matrix::new(data, rows, cols)
    }

    #[test]
    fn independent_streams() {
        let settings = TrainingSettings::default();
        let draw = |stream| {
            let mut rng = settings.rng(stream);
            (0..4).map(|_| rng.gen::<u64>()).collect::<Vec<_>>()
        };
        assert_eq!(draw(RngStream::Init), draw(RngStream::Init));
        assert_ne!(draw(RngStream::Split), draw(RngStream::Init));
        assert_ne!(draw(RngStream::Init), draw(RngStream::Epochs));
        assert_ne!(draw(RngStream::Split), draw(RngStream::Epochs));

        let max = TrainingSettings {
            seed: u64::MAX,
            ..Default::default()
        };
        assert_ne!(
            max.rng(RngStream::Split).gen::<u64>(),
            max.rng(RngStream::Init).gen::<u64>()
        );
    }

    #[test]
    fn activations() {
        let leaky = Activation::LeakyRelu(0.01);
        assert_eq!(leaky.apply(2.0), 2.0);
        assert_eq!(leaky.apply(-2.0), -0.02);
        assert_eq!(leaky.derivative(-2.0), 0.01);

        let celu = Activation::Celu(1.0);
        assert_eq!(celu.apply(3.0), 3.0);
        assert!((celu.apply(-1.0) - (-0.632120558)).abs() < 1E-8);
        assert!((celu.derivative(-1.0) - 0.367879441).abs() < 1E-8);
        assert!(celu.apply(-100.0) > -1.0 - 1E-12);
    }

    #[test]
    fn shapes_and_parameters() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = Autoencoder::new(170, 100, &mut rng);
        assert_eq!(model.parameter_count(), 54470);
        assert_eq!(model.features(), 170);
        assert_eq!(model.latent_dim(), 100);

        let x = random_matrix(5, 170, &mut rng);
        assert_eq!(model.encode(&x).shape(), (5, 100));
        assert_eq!(model.forward(&x), model.decode(&model.encode(&x)));
        assert!(model.to_string().contains(
            "(d2): Linear(in_features=100, out_features=170, bias=True), CELU(alpha=1.0)"
        ));

        let bound = 1.0 / (170f64).sqrt();
        assert!(model.layers[0]
            .weight
            .as_slice()
            .iter()
            .all(|w| w.abs() <= bound));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(5);
        let model = Autoencoder::new(4, 3, &mut rng);
        let x = random_matrix(6, 4, &mut rng);
        let (_, grads) = model.backprop(&x);

        let h = 1E-6;
        for (l, grad) in grads.iter().enumerate() {
            for (row, col) in [(0, 0), (1, 2), (2, 1)] {
                if row >= grad.weight.rows || col >= grad.weight.cols {
                    continue;
                }
                let mut plus = model.clone();
                plus.layers[l].weight[(row, col)] += h;
                let mut minus = model.clone();
                minus.layers[l].weight[(row, col)] -= h;
                let numeric = (mse(&plus.forward(&x), &x) - mse(&minus.forward(&x), &x)) / (2.0 * h);
                let analytic = grad.weight[(row, col)];
                assert!(
                    (numeric - analytic).abs() < 1E-6,
                    "layer {} ({}, {}): {} vs {}",
                    l,
                    row,
                    col,
                    numeric,
                    analytic
                );
            }

            let mut plus = model.clone();
            plus.layers[l].bias[0] += h;
            let mut minus = model.clone();
            minus.layers[l].bias[0] -= h;
            let numeric = (mse(&plus.forward(&x), &x) - mse(&minus.forward(&x), &x)) / (2.0 * h);
            assert!((numeric - grad.bias[0]).abs() < 1E-6);
        }
    }

    #[test]
    fn epoch_line() {
        let loss = EpochLoss {
            epoch: 3,
            epochs: 200,
            loss: 0.123456789,
            test_loss: 1.5,
        };
        assert_eq!(
            loss.to_string(),
            "epoch : 3/200, loss = 0.123457, test_loss = 1.500000"
        );
    }

    #[test]
    fn training_reduces_loss() {
        let mut rng = StdRng::seed_from_u64(9);
        // Samples on a 2-dimensional manifold embedded in 8 features
        let rows = (0..80)
            .map(|_| {
                let (a, b): (f64, f64) = (rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
                (0..8)
                    .map(|f| {
                        let f = f as f64;
                        0.5 * (a * (f + 1.0)).sin() + 0.4 * (b * (8.0 - f)).cos()
                    })
                    .collect()
            })
            .collect::<Vec<Vec<f64>>>();
        let data = Matrix::from_rows(&rows).unwrap();
        let train = data.select_rows(&(0..56).collect::<Vec<_>>());
        let test = data.select_rows(&(56..80).collect::<Vec<_>>());

        let settings = TrainingSettings {
            latent_dim: 6,
            epochs: 300,
            batch_size: 16,
            learning_rate: 5E-3,
            ..Default::default()
        };
        let mut model = Autoencoder::new(8, settings.latent_dim, &mut rng);
        let untrained = evaluate(&model, &test, 16);
        let mut seen = 0;
        let history = Trainer::new(&settings).fit(&mut model, &train, &test, |_| seen += 1);

        assert_eq!(seen, 300);
        assert_eq!(history.len(), 300);
        assert_eq!(history[299].epoch, 300);
        assert!(history.iter().all(|e| e.loss.is_finite() && e.test_loss.is_finite()));

        let head = history[..5].iter().map(|e| e.test_loss).sum::<f64>() / 5.0;
        let tail = history[295..].iter().map(|e| e.test_loss).sum::<f64>() / 5.0;
        assert!(tail < head, "{} -> {}", head, tail);
        assert!(tail < untrained * 0.5, "{} -> {}", untrained, tail);
        assert!((evaluate(&model, &test, 16) - history[299].test_loss).abs() < 1E-12);
    }

    #[test]
    fn empty_evaluation() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = Autoencoder::new(3, 2, &mut rng);
        assert!(evaluate(&model, &Matrix::zeros(0, 3), 8).is_nan());
    }
}
