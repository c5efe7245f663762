mod common;
use common::Fixture;
use sglx_extrema::meta::{read_floats, read_key_value_pairs, OFFSETS_SEPARATOR};
use sglx_extrema::{RecordingMeta, SglxError};

#[test]
fn reads_event_time_file() {
    let fixture = Fixture::new("floats");
    let path = fixture.path("rec_g0_tcat.nidq.xd_2_0_500.txt");
    std::fs::write(&path, "0.5\n1.5\n\n  2.25  \n").unwrap();

    assert_eq!(read_floats(&path).unwrap(), vec![0.5, 1.5, 2.25]);
}

#[test]
fn bad_event_time_is_reported() {
    let fixture = Fixture::new("bad_floats");
    let path = fixture.path("events.txt");
    std::fs::write(&path, "0.5\nabc\n").unwrap();

    let err = read_floats(&path).unwrap_err();
    assert!(matches!(err, SglxError::Meta { .. }));
    assert!(err.to_string().contains("abc"));
}

#[test]
fn reads_offsets_file_with_colon_separator() {
    let fixture = Fixture::new("offsets");
    let path = fixture.path("rec_g0_ct_offsets.txt");
    std::fs::write(&path, "sec_nidq: 0 20.0\nsmp_nidq: 0 400000\n").unwrap();

    let offsets = read_key_value_pairs(&path, OFFSETS_SEPARATOR).unwrap();
    assert_eq!(offsets.get("sec_nidq").map(String::as_str), Some("0 20.0"));
    assert_eq!(offsets.len(), 2);
}

#[test]
fn reads_meta_beside_bin() {
    let fixture = Fixture::new("meta_beside");
    let bin = fixture.write_bin("rec_t0.imec0.lf.bin", &[0; 12]);
    fixture.write_meta(&bin, 3, "typeThis=imec\nimSampRate=2500\n");

    let meta = RecordingMeta::read_for_bin(&bin).unwrap();
    assert_eq!(meta.file_size_bytes, 24);
    assert_eq!(meta.require_sample_rate().unwrap(), 2500.0);
    assert_eq!(meta.geometry().unwrap().n_file_samp(), 4);
}
