pub mod analysis;
pub mod app;
pub mod canvas;
pub mod countdown;
pub mod dispatch;
pub mod feedback;
pub mod filter;
pub mod media;
pub mod pipeline;
pub mod recorder;
pub mod session;

pub use app::App;
