#![no_main]

use libfuzzer_sys::fuzz_target;
use trigrep::index::SnapshotBuilder;

fuzz_target!(|data: &[u8]| {
    // Every window of the content must be posted for the file
    let trigrams = trigrep::utils::extract_trigrams(data);
    let _ = trigrep::utils::is_binary(data);
    let offsets = trigrep::utils::build_line_offsets(data);
    assert_eq!(offsets.first(), Some(&0));

    let mut builder = SnapshotBuilder::new();
    let id = builder.index_file("fuzz.bin", data.to_vec()).id();
    let snapshot = builder.finish(0);
    for trigram in trigrams {
        assert!(snapshot.postings().contains(trigram, id));
    }
});
