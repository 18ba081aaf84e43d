use matrix_util::dmatrix_io::DMatrix;
use matrix_util::traits::IoOps;

#[test]
fn tsv_round_trip_keeps_missing_entries() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("net.tsv");
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    let mat = DMatrix::from_row_slice(2, 3, &[0.0, 1.0, f64::NAN, 1.0, 0.0, 3.0]);
    mat.to_tsv(file)?;

    let read = DMatrix::<f64>::from_tsv(file, None)?;
    assert_eq!(read.shape(), (2, 3));
    assert!(read[(0, 2)].is_nan());
    assert_eq!(read[(1, 2)], 3.0);
    assert_eq!(read[(0, 1)], 1.0);
    Ok(())
}

#[test]
fn gzipped_tsv_is_readable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("net.tsv.gz");
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    let mat = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
    mat.to_tsv(file)?;

    let read = DMatrix::<f64>::from_tsv(file, None)?;
    assert_eq!(read, mat);
    Ok(())
}

#[test]
fn ragged_rows_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("bad.tsv");
    std::fs::write(&file, "0\t1\n1\n")?;
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    assert!(DMatrix::<f64>::from_tsv(file, None).is_err());
    Ok(())
}

#[test]
fn header_line_is_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("hdr.csv");
    std::fs::write(&file, "a,b\n0,1\nNA,0\n")?;
    let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

    let read = DMatrix::<f64>::read_file_delim(file, ",", Some(0))?;
    assert_eq!(read.shape(), (2, 2));
    assert!(read[(1, 0)].is_nan());
    Ok(())
}
