pub mod framing;
pub mod model;
pub mod protocol;

pub use framing::{encode_frame, FrameDecoder, FrameError, FrameState, OutboundBuffer};
pub use model::{Badge, Hotel, HotelSummary, Ratings, Review, ScoreState};
pub use protocol::{Envelope, Request, ServerResponse};

pub const LENGTH_PREFIX_SIZE: usize = 4;
pub const CATEGORY_COUNT: usize = 4;
pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 5;
/// Username a client sends when nobody is logged in on it
pub const NOT_LOGGED_IN: &str = "null";
