pub mod chart;
pub mod conductor;
pub mod note;
pub mod parsing;
pub mod playfield;
pub mod scroll;
pub mod timing;
