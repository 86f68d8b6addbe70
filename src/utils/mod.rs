pub mod msg_id;
pub mod utils_time;
