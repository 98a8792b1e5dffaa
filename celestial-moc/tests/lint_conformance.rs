use celestial_moc::lint::{self, Level, LintStatus, MapKind};
use celestial_moc::{Dimension, LintConfig, Moc, MocVersion, StMoc, WriteOptions};
use tempfile::tempdir;

const CARD: usize = 80;
const BLOCK: usize = 2880;

fn set_card(bytes: &mut [u8], key: &str, value: &str) {
    let prefix = format!("{key:<8}=");
    let card = bytes[BLOCK..2 * BLOCK]
        .chunks_exact_mut(CARD)
        .find(|c| c.starts_with(prefix.as_bytes()))
        .unwrap();
    let mut text = format!("{key:<8}= {value:>20}").into_bytes();
    text.resize(CARD, b' ');
    card.copy_from_slice(&text);
}

#[test]
fn test_two_columns_is_an_error() {
    let dir = tempdir().unwrap();
    let moc = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18 22").unwrap();
    let mut bytes = moc.to_fits(&WriteOptions::default()).unwrap();
    set_card(&mut bytes, "TFIELDS", "2");
    let path = dir.path().join("two-columns.fits");
    std::fs::write(&path, &bytes).unwrap();

    let report = lint::lint_path(&path, &LintConfig::default()).unwrap();
    assert_eq!(report.status(), LintStatus::Error);
    assert!(report.errors().any(|d| d.message.contains("TFIELDS")));
    assert!(report.to_string().lines().last().unwrap().contains("ERROR"));
}

#[test]
fn test_codec_output_conforms() {
    let sky = Moc::parse(Dimension::Space, "3/1 3 10 4/16-18 22 9/").unwrap();
    let st = StMoc::parse("t1/0 s3/1-2 t2/3 s4/0").unwrap();
    let config = LintConfig::default();

    for bytes in [
        sky.to_fits(&WriteOptions::default()).unwrap(),
        sky.to_ascii().into_bytes(),
        sky.to_json().unwrap().into_bytes(),
        st.to_bytes(&WriteOptions::default()).unwrap(),
        st.to_ascii().into_bytes(),
        st.to_json().unwrap().into_bytes(),
    ] {
        let report = lint::lint_bytes(&bytes, &config);
        assert_eq!(report.status(), LintStatus::Ok, "{report}");
    }
}

#[test]
fn test_error_cap() {
    let text: String = (12..100).map(|c| format!("0/{c} ")).collect();
    let report = lint::lint_bytes(text.as_bytes(), &LintConfig::default().with_max_errors(5));
    assert!(report.truncated);
    assert_eq!(report.count(Level::Error), 6);
}

#[test]
fn test_forced_legacy_version() {
    let moc = Moc::parse(Dimension::Space, "3/1 3").unwrap();
    let bytes = moc.to_fits(&WriteOptions::default()).unwrap();
    let config = LintConfig::default().with_version(MocVersion::V1_0);
    let report = lint::lint_bytes(&bytes, &config);
    assert_eq!(report.version, Some(MocVersion::V1_0));
    assert_eq!(report.kind, Some(MapKind::Space));
    // 2.0 keywords are flagged, but the map itself is valid 1.0 content.
    assert_eq!(report.status(), LintStatus::Warning, "{report}");
}
