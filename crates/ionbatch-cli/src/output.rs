use crate::runner::{ExploreRunner, TrainRunner};
use ionbatch_core::intensity::IntensitySeries;
use ionbatch_core::ml::autoencoder::EpochLoss;
use ionbatch_core::ml::matrix::Matrix;

fn write_tsv(
    path: &std::path::Path,
    headers: csv::ByteRecord,
    records: Vec<csv::ByteRecord>,
) -> anyhow::Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(vec![]);

    wtr.write_byte_record(&headers)?;
    for record in records {
        wtr.write_byte_record(&record)?;
    }
    wtr.flush()?;

    let bytes = wtr.into_inner()?;
    std::fs::write(path, bytes)?;
    Ok(path.display().to_string())
}

impl ExploreRunner {
    pub fn serialize_series(&self, series: &IntensitySeries) -> Vec<csv::ByteRecord> {
        let delimiter = &self.parameters.analysis.experiment_delimiter;
        series
            .records()
            .map(|(analyte, experiment, replicate, col, intensity)| {
                // Replicate labels are made unique by their column index, e.g. `ctrl#4`
                let sample = format!("{}{}{}", experiment, delimiter, col);
                let mut record = csv::ByteRecord::new();
                record.push_field(analyte.as_bytes());
                record.push_field(experiment.as_bytes());
                record.push_field(sample.as_bytes());
                record.push_field(itoa::Buffer::new().format(replicate).as_bytes());
                record.push_field(ryu::Buffer::new().format(intensity).as_bytes());
                record
            })
            .collect()
    }

    pub fn write_series(&self, file_name: &str, series: &IntensitySeries) -> anyhow::Result<String> {
        let path = self.make_path(file_name);
        let headers = csv::ByteRecord::from(vec![
            "analyte",
            "experiment",
            "sample",
            "replicate",
            "intensity",
        ]);
        write_tsv(&path, headers, self.serialize_series(series))
    }
}

impl TrainRunner {
    pub fn write_losses(&self, history: &[EpochLoss]) -> anyhow::Result<String> {
        let path = self.make_path("losses.tsv");
        let headers = csv::ByteRecord::from(vec!["epoch", "loss", "test_loss"]);
        let records = history
            .iter()
            .map(|epoch| {
                let mut record = csv::ByteRecord::new();
                record.push_field(itoa::Buffer::new().format(epoch.epoch).as_bytes());
                record.push_field(ryu::Buffer::new().format(epoch.loss).as_bytes());
                record.push_field(ryu::Buffer::new().format(epoch.test_loss).as_bytes());
                record
            })
            .collect();
        write_tsv(&path, headers, records)
    }

    /// Held-out samples after encoding and decoding, in original intensity units
    pub fn write_reconstruction(
        &self,
        reconstruction: &Matrix,
        batches: &[String],
    ) -> anyhow::Result<String> {
        let path = self.make_path("reconstruction.tsv");
        let mut headers = csv::ByteRecord::from(vec!["batch"]);
        for feature in 0..reconstruction.cols {
            headers.push_field(itoa::Buffer::new().format(feature).as_bytes());
        }
        let records = batches
            .iter()
            .enumerate()
            .map(|(row, batch)| {
                let mut record = csv::ByteRecord::new();
                record.push_field(batch.as_bytes());
                for x in reconstruction.row_slice(row) {
                    record.push_field(ryu::Buffer::new().format(*x).as_bytes());
                }
                record
            })
            .collect();
        write_tsv(&path, headers, records)
    }
}
