//! Loading a [`Dataset`] from an HDF5 file
//!
//! Expected layout:
//!
//! ```text
//! /annotation/name        ion names (byte strings)
//! /annotation/mzLabel     aligned m/z labels, e.g. "mz147.0764"
//! /ions/mz                m/z axis, one value per peak
//! /samples/perturbation   experiment label of each sample
//! /data                   intensities, samples x peaks
//! ```

use crate::dataset::{decode_label, parse_mz_label, Annotation, Dataset, Samples};
use crate::ml::matrix::Matrix;
use crate::Error;
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};
use ndarray::Array2;
use std::path::Path;

/// Read a 1-dimensional dataset of strings, whatever their HDF5 encoding
fn read_strings(file: &hdf5::File, name: &str) -> Result<Vec<String>, hdf5::Error> {
    let ds = file.dataset(name)?;
    let strings = match ds.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => ds
            .read_raw::<VarLenUnicode>()?
            .iter()
            .map(|s| decode_label(s.as_bytes()))
            .collect(),
        TypeDescriptor::VarLenAscii => ds
            .read_raw::<VarLenAscii>()?
            .iter()
            .map(|s| decode_label(s.as_bytes()))
            .collect(),
        TypeDescriptor::FixedUnicode(_) => ds
            .read_raw::<FixedUnicode<256>>()?
            .iter()
            .map(|s| decode_label(s.as_bytes()))
            .collect(),
        TypeDescriptor::FixedAscii(_) => ds
            .read_raw::<FixedAscii<256>>()?
            .iter()
            .map(|s| decode_label(s.as_bytes()))
            .collect(),
        other => {
            return Err(hdf5::Error::Internal(format!(
                "dataset {} holds {:?}, expected strings",
                name, other
            )))
        }
    };
    Ok(strings)
}

pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, Error> {
    let file = hdf5::File::open(path.as_ref())?;

    let names = read_strings(&file, "annotation/name")?;
    let mzs = read_strings(&file, "annotation/mzLabel")?
        .iter()
        .map(|label| parse_mz_label(label))
        .collect::<Result<Vec<_>, _>>()?;

    let axis = file.dataset("ions/mz")?.read_raw::<f64>()?;
    let perturbations = read_strings(&file, "samples/perturbation")?;

    // Stored samples x peaks
    let data: Array2<f64> = file.dataset("data")?.read_2d::<f64>()?;
    let (samples, peaks) = data.dim();
    let data = Matrix::new(data.t().iter().copied().collect::<Vec<_>>(), peaks, samples);

    log::trace!(
        "- {}: {} peaks, {} samples, {} annotated ions",
        path.as_ref().display(),
        peaks,
        samples,
        names.len()
    );

    Ok(Dataset {
        annotation: Annotation { names, mzs },
        samples: Samples {
            data,
            mzs: axis,
            names: perturbations,
        },
    })
}
