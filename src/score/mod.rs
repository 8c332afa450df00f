pub mod celebration;
pub mod parser;

pub use celebration::select_celebration;
pub use parser::{parse_score, ScoreEvent};
