use serde::{Deserialize, Serialize};

pub const PROTON: f64 = 1.007276;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64, f64),
    Da(f64, f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Ppm(-10.0, 10.0)
    }
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) around a theoretical m/z
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }
}

/// Absolute mass error of `observed` relative to `reference`, in parts-per-million
#[inline]
pub fn ppm_error(observed: f64, reference: f64) -> f64 {
    (observed - reference).abs() / reference * 1_000_000.0
}

/// A named analyte with a nominal m/z
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analyte {
    pub name: String,
    pub mz: f64,
}

impl Analyte {
    pub fn new<S: Into<String>>(name: S, mz: f64) -> Self {
        Self {
            name: name.into(),
            mz,
        }
    }
}

/// Monoisotopic neutral masses of the proteinogenic amino acids
const AMINO_ACID_MASSES: [(&str, f64); 20] = [
    ("Alanine", 89.047679),
    ("Arginine", 174.111676),
    ("Asparagine", 132.053493),
    ("Aspartate", 133.037509),
    ("Cysteine", 121.019750),
    ("Glutamate", 147.053159),
    ("Glutamine", 146.069143),
    ("Glycine", 75.032028),
    ("Histidine", 155.069477),
    ("Isoleucine", 131.094629),
    ("Leucine", 131.094629),
    ("Lysine", 146.105528),
    ("Methionine", 149.051049),
    ("Phenylalanine", 165.078979),
    ("Proline", 115.063329),
    ("Serine", 105.042593),
    ("Threonine", 119.058243),
    ("Tryptophan", 204.089878),
    ("Tyrosine", 181.073893),
    ("Valine", 117.078979),
];

/// Reference list of amino acids, as deprotonated [M-H]- ions
pub fn amino_acids() -> Vec<Analyte> {
    AMINO_ACID_MASSES
        .iter()
        .map(|(name, mass)| Analyte::new(*name, mass - PROTON))
        .collect()
}
