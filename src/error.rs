use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrapError {
    #[error("step count must be greater than zero")]
    InvalidStepCount,
    #[error("time step must be positive, got {0}")]
    InvalidTimeStep(f64),
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("physical parameter `{name}` out of range: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("unrecognized force table layout: {columns} columns")]
    UnrecognizedLayout { columns: usize },
    #[error("row {row}, column {column}: not a number")]
    MalformedField { row: usize, column: usize },
    #[error("row {row} has {got} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("input contains no samples")]
    EmptyData,
    #[error("not enough points: need at least {needed}, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },
    #[error("sample points do not span a two-dimensional region")]
    DegenerateMesh,
    #[error("triangulation rejected the sample points: {0}")]
    Triangulation(String),
    #[error("invalid passband: low edge {low} must lie below high edge {high}")]
    InvalidPassband { low: f64, high: f64 },
    #[error("cancelled by caller after {completed} steps")]
    Cancelled { completed: usize },
    #[error("failed to read table: {0}")]
    Table(String),
}

impl From<csv::Error> for TrapError {
    fn from(value: csv::Error) -> Self {
        TrapError::Table(value.to_string())
    }
}

impl From<spade::InsertionError> for TrapError {
    fn from(value: spade::InsertionError) -> Self {
        TrapError::Triangulation(format!("{value:?}"))
    }
}
