pub mod fader;
pub mod generator;
