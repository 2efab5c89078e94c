pub mod analysis;
pub mod dataset;
pub mod features;
#[cfg(feature = "hdf5")]
pub mod h5;
pub mod intensity;
pub mod locate;
pub mod mass;
pub mod ml;
pub mod normalize;

use dataset::{Dataset, DatasetError, FileFormat};
use features::TableError;
use locate::UnmatchedAnalyte;
use normalize::CorrectionError;
use std::path::Path;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    #[cfg(feature = "hdf5")]
    Hdf5(hdf5::Error),
    Dataset(DatasetError),
    Unmatched(UnmatchedAnalyte),
    Correction(CorrectionError),
    Table(TableError),
    UnsupportedFormat(String),
    /// HDF5 input requires building with the `hdf5` feature
    Hdf5Disabled(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            #[cfg(feature = "hdf5")]
            Self::Hdf5(e) => e.fmt(f),
            Self::Dataset(e) => e.fmt(f),
            Self::Unmatched(e) => e.fmt(f),
            Self::Correction(e) => e.fmt(f),
            Self::Table(e) => e.fmt(f),
            Self::UnsupportedFormat(path) => write!(
                f,
                "cannot infer the format of `{}`: expected .json, .h5 or .hdf5",
                path
            ),
            Self::Hdf5Disabled(path) => write!(
                f,
                "cannot read `{}`: HDF5 support was not enabled at build time",
                path
            ),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Error {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

impl_from! {
    std::io::Error => Io,
    serde_json::Error => Json,
    DatasetError => Dataset,
    UnmatchedAnalyte => Unmatched,
    CorrectionError => Correction,
    TableError => Table,
}

#[cfg(feature = "hdf5")]
impl_from! { hdf5::Error => Hdf5 }

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Load a dataset, choosing the reader from the file extension
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, Error> {
    let path = path.as_ref();
    let dataset: Dataset = match FileFormat::infer(path) {
        Some(FileFormat::Json) => read_json(path)?,
        #[cfg(feature = "hdf5")]
        Some(FileFormat::Hdf5) => h5::read_dataset(path)?,
        #[cfg(not(feature = "hdf5"))]
        Some(FileFormat::Hdf5) => {
            return Err(Error::Hdf5Disabled(path.display().to_string()))
        }
        None => return Err(Error::UnsupportedFormat(path.display().to_string())),
    };
    dataset.validate()?;
    Ok(dataset)
}
