//! Fixture files shared by the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use h5store_format::writer::{FileWriter, WriterStyle, WrittenChunk};

pub const STYLES: [WriterStyle; 2] = [WriterStyle::Classic, WriterStyle::Modern];

/// Bytes of chunk `n` in a fixture: every byte is `n`.
pub fn chunk_bytes(n: u8, len: usize) -> Vec<u8> {
    vec![n; len]
}

/// A file holding the standard dataset set:
///
/// - `/empty`: null dataspace
/// - `/scalar`: rank-0 contiguous, 8-byte element
/// - `/contiguous`: 4x5 float64, written
/// - `/lazy`: 100 int16, never written
/// - `/grid/sparse`: 24x16 int32 in 6x4 chunks, four chunks written at
///   (0,8) (0,12) (6,8) (6,12)
/// - `/grid/filtered`: 12 int32 in 4-element chunks, middle chunk
///   "compressed" to 5 bytes with filter 0 skipped on the last one
pub fn standard_file(style: WriterStyle) -> Vec<u8> {
    let mut w = FileWriter::with_style(style);
    let empty = w.null(4);
    let scalar = w.contiguous(&[], 8, Some(&1.5f64.to_le_bytes()[..]));
    let contiguous = w.contiguous(&[4, 5], 8, Some(chunk_bytes(7, 160).as_slice()));
    let lazy = w.contiguous(&[100], 2, None);

    let full = 6 * 4 * 4;
    let sparse = w.chunked(
        &[24, 16],
        &[6, 4],
        4,
        &[
            WrittenChunk::new(&[6, 12], chunk_bytes(4, full)),
            WrittenChunk::new(&[0, 8], chunk_bytes(1, full)),
            WrittenChunk::new(&[6, 8], chunk_bytes(3, full)),
            WrittenChunk::new(&[0, 12], chunk_bytes(2, full)),
        ],
    );
    let filtered = w.chunked(
        &[12],
        &[4],
        4,
        &[
            WrittenChunk::new(&[0], chunk_bytes(5, 16)),
            WrittenChunk::new(&[4], chunk_bytes(6, 5)),
            WrittenChunk::new(&[8], chunk_bytes(7, 16)).with_filter_mask(1),
        ],
    );
    let grid = w.group(&[("sparse", sparse), ("filtered", filtered)]);
    w.finish(&[
        ("empty", empty),
        ("scalar", scalar),
        ("contiguous", contiguous),
        ("lazy", lazy),
        ("grid", grid),
    ])
}

/// Write `bytes` to a file inside a fresh temporary directory.
pub fn write_temp(bytes: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.h5");
    std::fs::write(&path, bytes).unwrap();
    (dir, path)
}
