use serde::Serialize;

/// Standard envelope for successful JSON responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
