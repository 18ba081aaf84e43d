/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(file: &str, delim: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}

/// Row-wise operations on dense matrices
pub trait RowOps {
    type Mat;

    /// Scale each row to unit Euclidean norm; zero rows are left as is
    fn normalize_rows_inplace(&mut self);

    /// Index of the largest entry of each row (first one on ties)
    fn row_argmax(&self) -> Vec<usize>;

    /// `[self | other]`
    fn concatenate_horizontal(&self, other: &Self::Mat) -> anyhow::Result<Self::Mat>;
}
