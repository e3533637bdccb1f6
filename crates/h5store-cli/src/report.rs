//! Collecting byte streams per dataset and rendering them as text or JSON.

use std::io::Write;

use anyhow::Context;
use h5store::{digest_range, ByteRangeReader, ChunkDigest, File, StoreInfo};
use log::{debug, warn};
use serde::Serialize;

/// Only checksum on the thread pool when a dataset has more chunks than this.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 4;

/// One stored chunk (or contiguous block) of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteStream {
    pub index: u64,
    pub array_offset: Vec<u64>,
    pub file_offset: u64,
    pub size: u64,
    pub checksum: Option<ChunkDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub path: String,
    pub streams: Vec<ByteStream>,
}

/// Everything gathered from one file.
#[derive(Debug, Default)]
pub struct Report {
    pub datasets: Vec<DatasetReport>,
    /// Datasets that could not be indexed, with the reason.
    pub failures: Vec<(String, String)>,
}

/// Walk every dataset in `file`. Per-dataset failures are logged and
/// recorded; with `fail_fast` the first one is returned as the error.
pub fn collect<R>(
    file: &File,
    reader: &R,
    checksums: bool,
    fail_fast: bool,
) -> anyhow::Result<Report>
where
    R: ByteRangeReader + Sync,
{
    let mut report = Report::default();
    for (path, dataset) in file.visit_datasets() {
        let streams = dataset
            .and_then(|ds| ds.store())
            .and_then(|infos| byte_streams(reader, infos, checksums));
        match streams {
            Ok(streams) => {
                debug!("{path}: {} byte streams", streams.len());
                report.datasets.push(DatasetReport { path, streams });
            }
            Err(e) if fail_fast => {
                return Err(e).with_context(|| format!("dataset {path}"));
            }
            Err(e) => {
                warn!("skipping dataset {path}: {e}");
                report.failures.push((path, e.to_string()));
            }
        }
    }
    Ok(report)
}

fn byte_streams<R>(
    reader: &R,
    infos: Vec<StoreInfo>,
    checksums: bool,
) -> h5store::Result<Vec<ByteStream>>
where
    R: ByteRangeReader + Sync,
{
    let digests = if checksums {
        digests(reader, &infos)?
    } else {
        vec![None; infos.len()]
    };
    Ok(infos
        .into_iter()
        .zip(digests)
        .map(|(info, checksum)| ByteStream {
            index: info.index.unwrap_or_default(),
            array_offset: info.chunk_offset.unwrap_or_default(),
            file_offset: info.file_offset.unwrap_or_default(),
            size: info.size,
            checksum,
        })
        .collect())
}

fn digests<R>(reader: &R, infos: &[StoreInfo]) -> h5store::Result<Vec<Option<ChunkDigest>>>
where
    R: ByteRangeReader + Sync,
{
    #[cfg(feature = "parallel")]
    if infos.len() > PARALLEL_THRESHOLD {
        use rayon::prelude::*;
        return infos.par_iter().map(|info| digest_range(reader, info)).collect();
    }
    infos.iter().map(|info| digest_range(reader, info)).collect()
}

/// Python-style tuple: `()`, `(4,)`, `(0, 8)`.
fn tuple(values: &[u64]) -> String {
    match values {
        [] => String::from("()"),
        [one] => format!("({one},)"),
        many => {
            let parts: Vec<String> = many.iter().map(u64::to_string).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// One line per byte stream.
pub fn write_text<W: Write>(out: &mut W, report: &Report) -> std::io::Result<()> {
    for dataset in &report.datasets {
        if dataset.streams.is_empty() {
            writeln!(out, "Dataset: {} has no data", dataset.path)?;
            continue;
        }
        for stream in &dataset.streams {
            write!(
                out,
                "Dataset {}: index: {}; array offset: {}; at byte {} of size {} bytes",
                dataset.path,
                stream.index,
                tuple(&stream.array_offset),
                stream.file_offset,
                stream.size
            )?;
            if let Some(digest) = &stream.checksum {
                write!(out, "; {}: {}", digest.algorithm, digest.value)?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonChecksum<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct JsonByteStream<'a> {
    file_offset: u64,
    size: u64,
    index: u64,
    array_offset: &'a [u64],
    uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cksum: Option<JsonChecksum<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonDataset<'a> {
    byte_streams: Vec<JsonByteStream<'a>>,
}

/// `{ file_name: { dataset_path: { "byteStreams": [...] } } }`, each byte
/// stream tagged with a fresh random UUID.
pub fn to_json(file_name: &str, report: &Report) -> serde_json::Result<serde_json::Value> {
    let mut datasets = serde_json::Map::new();
    for dataset in &report.datasets {
        let byte_streams = dataset
            .streams
            .iter()
            .map(|s| JsonByteStream {
                file_offset: s.file_offset,
                size: s.size,
                index: s.index,
                array_offset: &s.array_offset,
                uuid: uuid::Uuid::new_v4().to_string(),
                cksum: s.checksum.as_ref().map(|d| JsonChecksum {
                    kind: d.algorithm,
                    value: &d.value,
                }),
            })
            .collect();
        datasets.insert(
            dataset.path.clone(),
            serde_json::to_value(JsonDataset { byte_streams })?,
        );
    }
    let mut root = serde_json::Map::new();
    root.insert(file_name.to_string(), serde_json::Value::Object(datasets));
    Ok(serde_json::Value::Object(root))
}
