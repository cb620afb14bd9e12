pub mod bpm;
pub mod pairing;
pub mod slicer;
pub mod tempo;
pub mod validator;
