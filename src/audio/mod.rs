pub mod frame_splitter;
pub mod merger;
pub mod state_machine;
pub mod vad;
pub mod wav;
