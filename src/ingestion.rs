use std::{fs::File, io::BufReader, path::Path};

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    extract::FieldExtractor,
    model::Batch,
    session::{AddReport, Session},
    store::{ContentSource, DocumentStore},
    walker::DiscoveredFile,
};

/// Read one batch from a JSON file.
pub fn load_batch(path: &Path) -> Result<Batch> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        Error::Config(format!("invalid batch file {}: {e}", path.display()))
    })
}

/// Totals over every file handed to [`ingest_files`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub batches: usize,
    pub report: AddReport,
}

/// Add each discovered batch file, in order, to an open session.
///
/// Stops at the first failing file. Batches already added stay queued in
/// the session; the caller decides whether to close it.
pub fn ingest_files<S, C, X>(
    session: &mut Session<S, C, X>,
    files: &[DiscoveredFile],
) -> Result<IngestSummary>
where
    S: DocumentStore,
    C: ContentSource,
    X: FieldExtractor,
{
    let mut summary = IngestSummary::default();
    for file in files {
        let batch = load_batch(&file.absolute_path)?;
        debug!(
            path = %file.relative_path.display(),
            entities = batch.len(),
            "loaded batch"
        );
        let report = session.add(&batch)?;
        summary.batches += 1;
        summary.report.merge(report);
    }
    info!(
        batches = summary.batches,
        indexed = summary.report.indexed,
        retrofitted = summary.report.retrofitted,
        "ingest complete"
    );
    Ok(summary)
}
