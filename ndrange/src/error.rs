use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum Error {
    /// NDRange must have between one and three dimensions.
    #[snafu(display("invalid work dimension {dims}: expected 1, 2 or 3"))]
    InvalidDims { dims: usize },

    #[snafu(display("dimension count mismatch: global has {dims}, local has {local}, offset has {offset}"))]
    LengthMismatch { dims: usize, local: usize, offset: usize },

    /// Global and local sizes must be non-zero in every used dimension.
    #[snafu(display("zero-sized dimension {dim}"))]
    ZeroSize { dim: usize },

    #[snafu(display("global size {global} is not a multiple of local size {local} in dimension {dim}"))]
    NotDivisible { dim: usize, global: usize, local: usize },
}
