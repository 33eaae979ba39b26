mod common;

use common::*;
use spike2_rs::{read, ChannelKind, DecodedPayload, Spike2Error};
use tempfile::TempDir;

fn sample_export() -> MatWriter {
    let (times, values) = sampled(1000, 2000.0, |t| (2.0 * std::f64::consts::PI * 10.0 * t).sin());
    MatWriter::new()
        .add("Keyboard", keyboard_record(&[13.3, 15.5], "J9"))
        .add("Trig", event_record(&[81.89, 81.89254]))
        .add("EMG", waveform_record(&times, &values, 0.0005, "V"))
        .add(
            "MU1",
            wavemark_record(&[1.0, 1.5, 2.0], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, "Volt"),
        )
        .add("Memory", textmark_record(&[5.0], "A"))
}

#[test]
fn test_read_all_channels_in_file_order() {
    let dir = TempDir::new().unwrap();
    let path = sample_export()
        .add("__globals__", scalar(0.0))
        .write(&dir.path().join("trial.mat"));

    let decoded = read(&path, None).unwrap();
    let kinds: Vec<(&str, ChannelKind)> = decoded
        .iter()
        .map(|(name, payload)| (name.as_str(), payload.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Keyboard", ChannelKind::Keyboard),
            ("Trig", ChannelKind::Event),
            ("EMG", ChannelKind::Waveform),
            ("MU1", ChannelKind::Wavemark),
            ("Memory", ChannelKind::Textmark),
        ]
    );
}

#[test]
fn test_read_decodes_payloads() {
    let dir = TempDir::new().unwrap();
    let path = sample_export().write(&dir.path().join("trial.mat"));
    let decoded = read(&path, None).unwrap();

    match &decoded[0].1 {
        DecodedPayload::Keyboard(p) => assert_eq!(p.codes, vec!["J", "9"]),
        other => panic!("unexpected payload {:?}", other),
    }
    match &decoded[2].1 {
        DecodedPayload::Waveform(p) => {
            assert_eq!(p.times.len(), 1000);
            assert_eq!(p.values.len(), 1000);
            assert_eq!(p.sampling_frequency, 2000);
            assert_eq!(p.units.as_deref(), Some("V"));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    match &decoded[3].1 {
        DecodedPayload::Wavemark(p) => {
            let grid = p.action_potentials.as_ref().unwrap();
            assert_eq!(grid.dim(), (2, 3));
            assert_eq!(grid[[0, 0]], 1.0);
            assert_eq!(grid[[1, 2]], 6.0);
            assert_eq!(p.sampling_frequency, Some(25000));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    match &decoded[4].1 {
        DecodedPayload::Textmark(p) => assert_eq!(p.codes, vec!["A"]),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn test_read_compressed_export() {
    let dir = TempDir::new().unwrap();
    let plain = read(sample_export().write(&dir.path().join("plain.mat")), None).unwrap();
    let packed = read(
        sample_export()
            .compressed()
            .write(&dir.path().join("packed.mat")),
        None,
    )
    .unwrap();
    assert_eq!(plain, packed);
}

#[test]
fn test_read_selected_channels() {
    let dir = TempDir::new().unwrap();
    let path = sample_export().write(&dir.path().join("trial.mat"));
    let wanted = vec!["MU1".to_string(), "Trig".to_string()];

    let decoded = read(&path, Some(wanted.as_slice())).unwrap();
    let names: Vec<&str> = decoded.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Trig", "MU1"]);
}

#[test]
fn test_read_missing_channel_lists_available() {
    let dir = TempDir::new().unwrap();
    let path = MatWriter::new()
        .add("A", event_record(&[1.0]))
        .add("B", event_record(&[2.0]))
        .write(&dir.path().join("trial.mat"));

    match read(&path, Some(&["Foo".to_string()][..])) {
        Err(Spike2Error::RecordNotFound {
            requested,
            available,
        }) => {
            assert_eq!(requested, "Foo");
            assert_eq!(available, vec!["A", "B"]);
        }
        other => panic!("expected RecordNotFound, got {:?}", other),
    }
}

#[test]
fn test_read_empty_keyboard_and_unsorted_wavemark() {
    let dir = TempDir::new().unwrap();
    let path = MatWriter::new()
        .add("Keyboard", keyboard_record(&[], ""))
        .add("MU2", wavemark_record(&[], &[], 0, ""))
        .write(&dir.path().join("trial.mat"));

    let decoded = read(&path, None).unwrap();
    match &decoded[0].1 {
        DecodedPayload::Keyboard(p) => {
            assert!(p.times.is_empty());
            assert!(p.codes.is_empty());
        }
        other => panic!("unexpected payload {:?}", other),
    }
    match &decoded[1].1 {
        DecodedPayload::Wavemark(p) => assert!(p.is_empty()),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn test_read_waveform_length_mismatch_is_truncated() {
    let dir = TempDir::new().unwrap();
    let path = MatWriter::new()
        .add(
            "EMG",
            waveform_record(&[0.0, 0.001, 0.002, 0.003], &[1.0, 2.0, 3.0], 0.001, "mV"),
        )
        .write(&dir.path().join("trial.mat"));

    match &read(&path, None).unwrap()[0].1 {
        DecodedPayload::Waveform(p) => {
            assert_eq!(p.times.len(), 3);
            assert_eq!(p.values.len(), 3);
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn test_read_malformed_wavemark() {
    let dir = TempDir::new().unwrap();
    let path = MatWriter::new()
        .add("MU1", wavemark_record(&[1.0, 2.0], &[1.0, 2.0, 3.0], 2, "V"))
        .write(&dir.path().join("trial.mat"));
    assert!(matches!(
        read(&path, None),
        Err(Spike2Error::MalformedWavemarkBlock(_))
    ));
}

#[test]
fn test_read_unrecognized_record_aborts() {
    let dir = TempDir::new().unwrap();
    let odd = Value::Struct(vec![
        ("a".to_string(), scalar(1.0)),
        ("b".to_string(), scalar(2.0)),
        ("c".to_string(), scalar(3.0)),
    ]);
    let path = sample_export()
        .add("Odd", odd)
        .write(&dir.path().join("trial.mat"));

    match read(&path, None) {
        Err(Spike2Error::UnrecognizedRecordShape { name, field_count }) => {
            assert_eq!(name, "Odd");
            assert_eq!(field_count, 3);
        }
        other => panic!("expected UnrecognizedRecordShape, got {:?}", other),
    }
}

#[test]
fn test_read_rejects_other_formats() {
    let dir = TempDir::new().unwrap();
    let smr = dir.path().join("trial.smr");
    std::fs::write(&smr, b"not a mat file").unwrap();
    match read(&smr, None) {
        Err(e @ Spike2Error::WrongFileType(_)) => {
            assert!(e.to_string().contains("export the data to .mat"));
        }
        other => panic!("expected WrongFileType, got {:?}", other),
    }

    assert!(matches!(
        read(dir.path().join("missing.mat"), None),
        Err(Spike2Error::FileNotFound(_))
    ));

    let garbage = dir.path().join("garbage.mat");
    std::fs::write(&garbage, b"too short").unwrap();
    assert!(matches!(
        read(&garbage, None),
        Err(Spike2Error::ParseError(_))
    ));
}
