//! End-to-end scenarios across the two pipelines: snapshot to ctl map
//! to skool text, and skool source to binary.

use std::io::Write as _;
use std::path::PathBuf;

use skool::{Base, BlockKind, Snapshot};
use zedkit_core::components::Config;
use zedkit_core::ctl::{get_blocks, CtlParser};
use zedkit_core::{
    generate_ctls, write_ctl, BinWriter, BinWriterOptions, SkoolWriter,
    WriteOptions,
};

/// A throwaway file in the system temp directory.
struct TempFile(PathBuf);

impl TempFile {
    fn create(name: &str, contents: &[u8]) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("zedkit-e2e-{}-{name}", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        Self(path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Render a classified snapshot as skool text.
fn render_skool(snapshot: &Snapshot, ctls: &zedkit_core::ctl::CtlMap) -> String {
    let writer = SkoolWriter::new(
        snapshot,
        &CtlParser::from_ctls(ctls),
        WriteOptions::default(),
        &Config::default(),
    )
    .unwrap();
    let mut out = Vec::new();
    writer.write_skool(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn snapshot_to_skool_without_a_code_map() {
    let snapshot = Snapshot::from_data(&[0xAF, 0xC9], 30000);
    let ctls = generate_ctls(&snapshot, 30000, 30002, None).unwrap();
    assert_eq!(
        get_blocks(&ctls),
        vec![(BlockKind::Code, 30000, 30002)]
    );
    let text = render_skool(&snapshot, &ctls);
    assert!(text.contains("; Routine at 30000"), "got:\n{text}");
    assert!(text.contains("c30000 XOR A"), "got:\n{text}");
    assert!(text.contains(" 30001 RET"), "got:\n{text}");
}

#[test]
fn snapshot_to_skool_with_a_code_map() {
    // XOR A / RET at 30000, "HELLO WORLD" at 30002, zeroes to 30020
    let mut snapshot = Snapshot::new();
    snapshot.poke(30000, &[0xAF, 0xC9]);
    snapshot.poke(30002, b"HELLO WORLD");

    // A Z80-emulator bitmap marking address 30000 as executed
    let mut bitmap = vec![0_u8; 8192];
    bitmap[30000 / 8] = 1 << (30000 % 8);
    let map = TempFile::create("with-map.z80map", &bitmap);

    let ctls =
        generate_ctls(&snapshot, 30000, 30020, Some(map.0.as_path())).unwrap();
    assert_eq!(
        ctls.iter().map(|(a, k)| (*a, *k)).collect::<Vec<_>>(),
        vec![
            (30000, BlockKind::Code),
            (30002, BlockKind::Text),
            (30013, BlockKind::Zero),
            (30020, BlockKind::Ignore),
        ],
        "the executed run extends to its RET, the text is recognised, \
         and the zero tail collapses"
    );

    let text = render_skool(&snapshot, &ctls);
    assert!(text.contains("c30000 XOR A"), "got:\n{text}");
    assert!(
        text.contains("t30002 DEFM \"HELLO WORLD\""),
        "got:\n{text}"
    );
    assert!(text.contains("s30013 DEFS 7"), "got:\n{text}");
}

#[test]
fn interior_terminals_split_code_blocks() {
    // Two back-to-back routines, all executed
    let mut snapshot = Snapshot::new();
    snapshot.poke(30000, &[0xAF, 0xC9, 0xAF, 0xC9]);

    let mut bitmap = vec![0_u8; 8192];
    bitmap[30000 / 8] = 0b0000_1111;
    let map = TempFile::create("split.z80map", &bitmap);

    let ctls =
        generate_ctls(&snapshot, 30000, 30010, Some(map.0.as_path())).unwrap();
    assert_eq!(
        ctls.iter().map(|(a, k)| (*a, *k)).collect::<Vec<_>>(),
        vec![
            (30000, BlockKind::Code),
            (30002, BlockKind::Code),
            (30004, BlockKind::Zero),
            (30010, BlockKind::Ignore),
        ],
        "a terminal instruction strictly inside a code block splits it"
    );
}

#[test]
fn branch_joined_blocks_fuse_with_a_code_map() {
    // 30000: JP 30003 / 30003: RET, all executed.  The terminal split
    // separates the RET into its own block, then the jump into its
    // start fuses the pair back together.
    let mut snapshot = Snapshot::new();
    snapshot.poke(30000, &[0xC3, 0x33, 0x75, 0xC9]);

    let mut bitmap = vec![0_u8; 8192];
    bitmap[30000 / 8] = 0b0000_1111;
    let map = TempFile::create("join.z80map", &bitmap);

    let ctls =
        generate_ctls(&snapshot, 30000, 30010, Some(map.0.as_path())).unwrap();
    assert_eq!(
        ctls.iter().map(|(a, k)| (*a, *k)).collect::<Vec<_>>(),
        vec![
            (30000, BlockKind::Code),
            (30004, BlockKind::Zero),
            (30010, BlockKind::Ignore),
        ],
        "the JP and its target stay one block"
    );
}

#[test]
fn skool_to_bin_round_trips_through_the_disassembler() {
    // Disassemble a tiny routine, then assemble the text back
    let snapshot = Snapshot::from_data(
        &[0x3E, 0x01, 0x06, 0x02, 0xC3, 0x00, 0x80],
        32768,
    );
    let ctls = generate_ctls(&snapshot, 32768, 32775, None).unwrap();
    let text = render_skool(&snapshot, &ctls);

    let writer = BinWriter::new(
        text.as_bytes(),
        "roundtrip.skool",
        BinWriterOptions::default(),
    )
    .unwrap();
    let mut out = Vec::new();
    let (base, end, size) = writer.write(&mut out).unwrap();
    assert_eq!((base, end, size), (32768, 32775, 7));
    assert_eq!(
        out,
        vec![0x3E, 0x01, 0x06, 0x02, 0xC3, 0x00, 0x80],
        "mode-0 assembly of the generated skool reproduces the bytes"
    );
}

#[test]
fn generated_ctl_files_parse_back_into_the_same_blocks() {
    let mut snapshot = Snapshot::new();
    snapshot.poke(40000, &[0xC9]);
    snapshot.poke(40001, b"Hello, hello, hello ");
    let ctls = generate_ctls(&snapshot, 40000, 40030, None).unwrap();

    let mut out = Vec::new();
    write_ctl(&mut out, &ctls, Base::Decimal).unwrap();
    let text = String::from_utf8(out).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("@ 40000 start"));
    assert_eq!(lines.next(), Some("@ 40000 org"));
    for (line, (kind, start, _)) in lines.zip(get_blocks(&ctls)) {
        assert_eq!(
            line,
            format!("{} {:05}", kind.to_char(), start),
            "every block appears once, in address order"
        );
    }
}

#[test]
fn classification_round_trip_is_stable() {
    // Classify, re-expand the map, and classify the same bytes again:
    // the partition must not change
    let mut snapshot = Snapshot::new();
    snapshot.poke(50000, &[0xAF, 0x18, 0xFE]);
    snapshot.poke(50010, b"SCORE 00000");
    let first = generate_ctls(&snapshot, 50000, 50030, None).unwrap();
    let second = generate_ctls(&snapshot, 50000, 50030, None).unwrap();
    assert_eq!(first, second);

    // Every address is covered by exactly one block
    let blocks = get_blocks(&first);
    let mut covered = 0;
    for (_, start, end) in &blocks {
        assert_eq!(*start, 50000 + covered, "blocks tile the range");
        covered += end - start;
    }
    assert_eq!(covered, 30);
}
