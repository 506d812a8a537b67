pub mod normalize;
pub mod payload;
