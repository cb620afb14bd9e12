pub mod audio;
pub mod midi;
pub mod progress;
pub mod scanner;
