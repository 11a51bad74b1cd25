use std::alloc::LayoutError;

impl From<LayoutError> for AllocError {
    fn from(_: LayoutError) -> Self {
        Self::RequestOverflow
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AllocError {
    Oom,
    RequestOverflow,
}
