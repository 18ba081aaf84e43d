use crate::common_io::{read_lines_of_words_delim, write_lines};
use crate::traits::IoOps;
pub use nalgebra::{DMatrix, DVector};

/// Tokens read as a missing entry
const MISSING_TOKENS: [&str; 4] = ["NA", "NaN", "nan", "."];

fn parse_entry(token: &str) -> Option<f64> {
    if token.is_empty() || MISSING_TOKENS.contains(&token) {
        return Some(f64::NAN);
    }
    token.parse::<f64>().ok()
}

fn format_entry(x: f64) -> String {
    if x.is_nan() {
        "NA".to_string()
    } else {
        format!("{}", x)
    }
}

impl IoOps for DMatrix<f64> {
    type Scalar = f64;
    type Mat = Self;

    fn read_file_delim(
        tsv_file: &str,
        delim: &str,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1, // no skipping
        };

        let words = read_lines_of_words_delim(tsv_file, delim, hdr_line)?.lines;

        if words.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", tsv_file));
        }

        let ncols = words[0].len();
        let nrows = words.len();
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, line) in words.iter().enumerate() {
            if line.len() != ncols {
                return Err(anyhow::anyhow!(
                    "{}: line {} has {} fields, expected {}",
                    tsv_file,
                    i + 1,
                    line.len(),
                    ncols
                ));
            }
            for token in line.iter() {
                let x = parse_entry(token).ok_or(anyhow::anyhow!(
                    "{}: line {}: cannot parse `{}`",
                    tsv_file,
                    i + 1,
                    token
                ))?;
                data.push(x);
            }
        }

        Ok(DMatrix::<f64>::from_row_iterator(nrows, ncols, data))
    }

    fn write_file_delim(&self, tsv_file: &str, delim: &str) -> anyhow::Result<()> {
        let lines: Vec<Box<str>> = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|&x| format_entry(x))
                    .collect::<Vec<String>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect();

        write_lines(&lines, tsv_file)?;
        Ok(())
    }
}
