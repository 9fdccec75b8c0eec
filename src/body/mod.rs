mod limit;
mod request_body;
mod response_body;

pub use limit::parse_limit;
pub use request_body::RequestBody;
pub use response_body::{BufferBody, ResponseBody};
