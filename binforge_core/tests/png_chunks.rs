use binforge_core::action::{Crc32, Deflate, Length, invert};
use binforge_core::fuzz::{DirectorySink, FuzzPlan, Fuzzer};
use binforge_core::{Endian, FieldTemplate, FuzzPatch, Packing, Tree, Value};
use flate2::read::ZlibDecoder;
use std::io::Read;

const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

fn u32_field(name: &str) -> FieldTemplate {
    FieldTemplate::int(name, Packing::unsigned(4, Endian::Big))
}

fn u8_field(name: &str) -> FieldTemplate {
    FieldTemplate::int(name, Packing::unsigned(1, Endian::Big))
}

fn chunk(name: &str, tag: &str, data: FieldTemplate) -> FieldTemplate {
    FieldTemplate::composite(name)
        .with_field(u32_field("length").computed(Length, ["data"]))
        .with_field(FieldTemplate::string("type").value(tag).no_fuzz())
        .with_field(data)
        .with_field(u32_field("crc").computed(Crc32, ["type", "data"]))
}

fn png() -> FieldTemplate {
    let ihdr = FieldTemplate::composite("data")
        .with_field(u32_field("width").value(1u32))
        .with_field(u32_field("height").value(1u32))
        .with_field(u8_field("depth").value(8u8))
        .with_field(u8_field("color_type").value(2u8))
        .with_field(u8_field("compression").value(0u8))
        .with_field(u8_field("filter").value(0u8))
        .with_field(u8_field("interlace").value(0u8));

    let idat = FieldTemplate::composite("data")
        .action(Deflate::default())
        .with_field(FieldTemplate::string("pixels").deferred(|scope| {
            let width = scope.int("^.^.ihdr.data.width")?;
            let height = scope.int("^.^.ihdr.data.height")?;
            let mut rows = Vec::new();
            for _ in 0..height {
                rows.push(0);
                for _ in 0..width {
                    rows.extend([0xff, 0x00, 0x00]);
                }
            }
            Ok(Value::Bytes(rows))
        }));

    FieldTemplate::composite("png")
        .with_field(FieldTemplate::string("signature").value(SIGNATURE).no_fuzz())
        .with_field(chunk("ihdr", "IHDR", ihdr))
        .with_field(chunk("idat", "IDAT", idat))
        .with_field(chunk("iend", "IEND", FieldTemplate::composite("data")))
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Splits a serialized PNG into `(type, data, crc)` chunks, checking lengths.
fn chunks(bytes: &[u8]) -> Vec<(String, Vec<u8>, u32)> {
    assert_eq!(&bytes[..8], SIGNATURE);
    let mut rest = &bytes[8..];
    let mut out = Vec::new();
    while !rest.is_empty() {
        let len = u32::from_be_bytes(rest[..4].try_into().unwrap()) as usize;
        let tag = String::from_utf8(rest[4..8].to_vec()).unwrap();
        let data = rest[8..8 + len].to_vec();
        let crc = u32::from_be_bytes(rest[8 + len..12 + len].try_into().unwrap());
        out.push((tag, data, crc));
        rest = &rest[12 + len..];
    }
    out
}

#[test]
fn serializes_a_valid_single_pixel_png() {
    let mut tree = Tree::new(&png(), 0).unwrap();
    let root = tree.root();
    let bytes = tree.to_bytes(root).unwrap();

    let ihdr: &[u8] = &[
        0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xde,
    ];
    assert_eq!(&bytes[8..8 + ihdr.len()], ihdr);

    let iend: &[u8] = &[0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xae, 0x42, 0x60, 0x82];
    assert!(bytes.ends_with(iend));

    let parsed = chunks(&bytes);
    let tags: Vec<&str> = parsed.iter().map(|(t, _, _)| t.as_str()).collect();
    assert_eq!(tags, ["IHDR", "IDAT", "IEND"]);
    for (tag, data, crc) in &parsed {
        let mut covered = tag.as_bytes().to_vec();
        covered.extend(data);
        assert_eq!(*crc, crc32fast::hash(&covered), "crc of {tag}");
    }
    assert_eq!(inflate(&parsed[1].1), vec![0x00, 0xff, 0x00, 0x00]);
}

#[test]
fn widening_the_image_updates_dependent_chunks() {
    let mut tree = Tree::new(&png(), 0).unwrap();
    let root = tree.root();
    let before = chunks(&tree.to_bytes(root).unwrap());

    let width = tree.lookup("ihdr.data.width").unwrap();
    tree.set_literal(width, 3u32).unwrap();
    let after = chunks(&tree.to_bytes(root).unwrap());

    assert_ne!(before[0].2, after[0].2);
    assert_eq!(inflate(&after[1].1).len(), 1 + 3 * 3);

    let idat_data = tree.lookup("idat.data").unwrap();
    let compressed = tree.to_bytes(idat_data).unwrap();
    assert_eq!(compressed, after[1].1);
    assert_eq!(
        invert(&Deflate::default(), &compressed).unwrap(),
        inflate(&compressed)
    );

    let iend = tree.lookup("iend").unwrap();
    let expected = tree.result_length(root).unwrap() - 12;
    assert_eq!(tree.offset(iend).unwrap(), expected);
}

#[test]
fn fuzzing_the_header_writes_valid_chunk_framing() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = Tree::new(&png(), 0).unwrap();
    let root = tree.root();
    let original = tree.to_bytes(root).unwrap();

    let ihdr = tree.lookup("ihdr").unwrap();
    let mut sink = DirectorySink::new(dir.path())
        .unwrap()
        .with_prefix("ihdr_")
        .with_extension("png");
    let plan = FuzzPlan::new(1, 1).with_max_trials(40);
    let keep_length = FuzzPatch {
        enabled: Some(false),
        ..FuzzPatch::default()
    };
    let report = Fuzzer::new(&mut tree, ihdr, plan)
        .patch("ihdr.length", keep_length)
        .run(&mut sink)
        .unwrap();
    assert_eq!(report.trials, 40);
    assert!(report.truncated);

    for record in sink.records() {
        assert!(record.fields.iter().all(|f| f.starts_with("ihdr.") && f != "ihdr.length"));
        let chunk = std::fs::read(dir.path().join(&record.file)).unwrap();
        let len = u32::from_be_bytes(chunk[..4].try_into().unwrap()) as usize;
        assert_eq!(chunk.len(), 12 + len);
        assert_eq!(&chunk[4..8], b"IHDR");
    }
    assert!(dir.path().join(DirectorySink::INDEX_FILENAME).exists());
    assert_eq!(tree.to_bytes(root).unwrap(), original);
}
