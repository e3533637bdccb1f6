//! End-to-end store-info behaviour over fixture files written in both the
//! classic and the modern on-disk formats, opened from disk.

mod common;

use common::{chunk_bytes, standard_file, write_temp, STYLES};
use h5store::{
    digest_range, ByteRangeReader, ChunkDigest, DatasetLayout, Error, File, FileRangeReader,
    StoreInfo,
};
use h5store_format::writer::{FileWriter, WriterStyle, WrittenChunk};

fn open(bytes: &[u8]) -> (tempfile::TempDir, File) {
    let (dir, path) = write_temp(bytes);
    let file = File::open(&path).unwrap();
    (dir, file)
}

#[test]
fn shapeless_dataset_has_no_records() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let ds = file.dataset("empty").unwrap();
        let store = ds.store_info().unwrap();
        assert_eq!(store.layout(), &DatasetLayout::Shapeless);
        assert!(store.list_all().is_empty());
        assert_eq!(store.chunk_count(), 0);
        assert!(matches!(store.get_by_index(0), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(
            store.get_by_coordinate(&[0]),
            Err(Error::IndexOutOfRange { .. })
        ));
    }
}

#[test]
fn contiguous_has_at_most_one_record() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        for path in ["contiguous", "scalar", "lazy"] {
            let store = file.dataset(path).unwrap().store_info().unwrap().clone();
            assert!(store.chunk_count() <= 1, "{path}");
            if store.chunk_count() == 1 {
                let info = &store.list_all()[0];
                let layout = store.layout();
                let expected = layout.element_count().unwrap() * layout.dtype_size().unwrap();
                assert_eq!(info.size, expected, "{path}");
                assert!(info.chunk_offset.as_ref().unwrap().iter().all(|&c| c == 0));
                assert_eq!(info.index, Some(0));
            }
        }
    }
}

#[test]
fn unwritten_contiguous_answers_point_queries() {
    let (_dir, file) = open(&standard_file(STYLES[0]));
    let store = file.dataset("lazy").unwrap().store_info().unwrap().clone();
    assert!(store.list_all().is_empty());
    assert_eq!(
        store.get_by_index(0).unwrap(),
        StoreInfo::unwritten(Some(0), None)
    );
    assert_eq!(
        store.get_by_coordinate(&[0]).unwrap(),
        StoreInfo::unwritten(None, Some(vec![0]))
    );
}

#[test]
fn chunked_bulk_and_point_queries_agree() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        for path in ["grid/sparse", "grid/filtered"] {
            let store = file.dataset(path).unwrap().store_info().unwrap().clone();
            for info in store.list_all() {
                let coordinate = info.chunk_offset.clone().unwrap();
                assert_eq!(store.get_by_coordinate(&coordinate).unwrap(), info);
                assert_eq!(store.get_by_index(info.index.unwrap()).unwrap(), info);
            }
        }
    }
}

#[test]
fn one_past_last_written_is_a_placeholder() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let store = file.dataset("grid/sparse").unwrap().store_info().unwrap().clone();
        let last = store.list_all().last().and_then(|s| s.index).unwrap();
        let next = store.get_by_index(last + 1).unwrap();
        assert_eq!(next.file_offset, None);
        assert_eq!(next.size, 0);
        assert_eq!(next.filter_mask, 0);
        assert_eq!(next.chunk_offset, None);
    }
}

#[test]
fn index_beyond_grid_is_out_of_range() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let store = file.dataset("grid/sparse").unwrap().store_info().unwrap().clone();
        assert!(matches!(store.get_by_index(16), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(
            store.get_by_index(u64::MAX),
            Err(Error::IndexOutOfRange { .. })
        ));
    }
}

#[test]
fn unaligned_coordinate_is_invalid() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let store = file.dataset("grid/sparse").unwrap().store_info().unwrap().clone();
        assert!(matches!(
            store.get_by_coordinate(&[0, 7]),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            store.get_by_coordinate(&[0]),
            Err(Error::InvalidCoordinate { .. })
        ));
    }
}

#[test]
fn sparse_grid_end_to_end() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let ds = file.dataset("/grid/sparse").unwrap();
        let store = ds.store_info().unwrap();
        let DatasetLayout::Chunked { grid, dtype_size } = store.layout() else {
            panic!("expected chunked layout");
        };
        assert_eq!(grid.num_chunks(), 16);

        let all = store.list_all();
        let indexes: Vec<_> = all.iter().map(|s| s.index.unwrap()).collect();
        assert_eq!(indexes, vec![2, 3, 6, 7]);
        let offsets: Vec<_> = all.iter().map(|s| s.chunk_offset.clone().unwrap()).collect();
        assert_eq!(offsets, vec![vec![0, 8], vec![0, 12], vec![6, 8], vec![6, 12]]);
        assert!(all.iter().all(|s| s.size == 6 * 4 * dtype_size));

        let written: Vec<u64> = indexes.clone();
        for index in (0..16).filter(|i| !written.contains(i)) {
            let info = store.get_by_index(index).unwrap();
            assert_eq!(info, StoreInfo::unwritten(Some(index), None));
        }
    }
}

#[test]
fn listed_ranges_are_readable() {
    for style in STYLES {
        let bytes = standard_file(style);
        let (_dir, path) = write_temp(&bytes);
        let file = File::open(&path).unwrap();
        let reader = FileRangeReader::new(&path);
        for (name, dataset) in file.visit_datasets() {
            let dataset = dataset.unwrap();
            for info in dataset.store().unwrap() {
                let offset = info.file_offset.unwrap();
                let data = reader.read(offset, info.size).unwrap();
                assert_eq!(data.len() as u64, info.size, "{name}");
                assert_eq!(
                    digest_range(&reader, &info).unwrap(),
                    Some(ChunkDigest::of(&data))
                );
                assert_eq!(file.reader().read(offset, info.size).unwrap(), data);
            }
        }
    }
}

#[test]
fn chunk_contents_follow_their_coordinates() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let store = file.dataset("grid/sparse").unwrap().store().unwrap();
        // fixture chunk n is filled with byte n, numbered in grid order
        for (n, info) in store.iter().enumerate() {
            let data = file
                .reader()
                .read(info.file_offset.unwrap(), info.size)
                .unwrap();
            assert!(data.iter().all(|&b| b == n as u8 + 1));
        }
    }
}

#[test]
fn filtered_sizes_and_masks() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let store = file.dataset("grid/filtered").unwrap().store().unwrap();
        let sizes: Vec<_> = store.iter().map(|s| s.size).collect();
        assert_eq!(sizes, vec![16, 5, 16]);
        let masks: Vec<_> = store.iter().map(|s| s.filter_mask).collect();
        assert_eq!(masks, vec![0, 0, 1]);
    }
}

#[test]
fn truncated_file_is_a_short_read() {
    let bytes = standard_file(STYLES[0]);
    let (_dir, path) = write_temp(&bytes);
    let file = File::open_buffered(&path).unwrap();
    let info = file.dataset("contiguous").unwrap().store().unwrap()[0].clone();

    let cut = info.file_offset.unwrap() + info.size / 2;
    std::fs::write(&path, &bytes[..cut as usize]).unwrap();
    let reader = FileRangeReader::new(&path);
    assert!(matches!(
        digest_range(&reader, &info),
        Err(Error::ShortRead { .. })
    ));
}

#[test]
fn visit_reports_every_dataset_once() {
    for style in STYLES {
        let (_dir, file) = open(&standard_file(style));
        let paths: Vec<_> = file
            .visit_datasets()
            .into_iter()
            .map(|(path, result)| {
                assert!(result.is_ok(), "{path}");
                path
            })
            .collect();
        assert_eq!(
            paths,
            [
                "/contiguous",
                "/empty",
                "/grid/filtered",
                "/grid/sparse",
                "/lazy",
                "/scalar"
            ]
        );
    }
}

#[test]
fn corrupt_chunk_btree_is_layout_unavailable() {
    let mut w = FileWriter::new();
    let d = w.chunked(
        &[8],
        &[4],
        1,
        &[WrittenChunk::new(&[0], chunk_bytes(1, 4))],
    );
    let mut bytes = w.finish(&[("d", d)]);
    // type 1 nodes index raw data chunks, type 0 nodes index group links
    let nodes: Vec<usize> = bytes
        .windows(5)
        .enumerate()
        .filter(|(_, w)| w[..4] == *b"TREE" && w[4] == 1)
        .map(|(at, _)| at)
        .collect();
    assert!(!nodes.is_empty());
    for at in nodes {
        bytes[at..at + 4].copy_from_slice(b"XXXX");
    }

    let (_dir, file) = open(&bytes);
    let dataset = file.dataset("d").unwrap();
    assert!(matches!(dataset.store(), Err(Error::LayoutUnavailable(_))));
}

#[test]
fn resizable_datasets_list_written_chunks_by_grid_position() {
    let mut w = FileWriter::with_style(WriterStyle::Modern);
    let full = 6 * 4;
    let bounded = w.chunked_resizable(
        &[12, 8],
        &[Some(24), Some(16)],
        &[6, 4],
        1,
        &[
            WrittenChunk::new(&[6, 4], chunk_bytes(4, full)),
            WrittenChunk::new(&[0, 0], chunk_bytes(1, full)),
            WrittenChunk::new(&[6, 0], chunk_bytes(3, full)),
            WrittenChunk::new(&[0, 4], chunk_bytes(2, full)),
        ],
    );
    let growing = w.chunked_resizable(
        &[12, 8],
        &[None, Some(8)],
        &[6, 4],
        1,
        &[
            WrittenChunk::new(&[6, 4], chunk_bytes(2, full)),
            WrittenChunk::new(&[0, 0], chunk_bytes(1, full)),
        ],
    );
    let open_ended = w.chunked_resizable(
        &[12, 8],
        &[None, None],
        &[6, 4],
        1,
        &[
            WrittenChunk::new(&[6, 0], chunk_bytes(2, full)),
            WrittenChunk::new(&[0, 4], chunk_bytes(1, full)),
        ],
    );
    let bytes = w.finish(&[
        ("bounded", bounded),
        ("growing", growing),
        ("open_ended", open_ended),
    ]);
    let (_dir, file) = open(&bytes);

    let expected: [(&str, &[(u64, [u64; 2])]); 3] = [
        ("bounded", &[(0, [0, 0]), (1, [0, 4]), (2, [6, 0]), (3, [6, 4])]),
        ("growing", &[(0, [0, 0]), (3, [6, 4])]),
        ("open_ended", &[(1, [0, 4]), (2, [6, 0])]),
    ];
    for (path, chunks) in expected {
        let store = file.dataset(path).unwrap().store().unwrap();
        let found: Vec<_> = store
            .iter()
            .map(|s| (s.index.unwrap(), s.chunk_offset.clone().unwrap()))
            .collect();
        let wanted: Vec<_> = chunks.iter().map(|(i, o)| (*i, o.to_vec())).collect();
        assert_eq!(found, wanted, "{path}");
        for (n, info) in store.iter().enumerate() {
            assert_eq!(info.size, full as u64, "{path}");
            let data = file
                .reader()
                .read(info.file_offset.unwrap(), info.size)
                .unwrap();
            assert!(data.iter().all(|&b| b == n as u8 + 1), "{path}");
        }
    }
}
