//! Image generation providers, one module per vendor protocol.

pub mod cogview;
pub mod minimax;
pub mod openai;
pub mod qianfan;
pub mod volcengine;
pub mod wanx;

pub use cogview::CogviewProvider;
pub use minimax::MinimaxProvider;
pub use openai::{OpenAiImageFamily, OpenAiImageProvider};
pub use qianfan::QianfanProvider;
pub use volcengine::VolcengineProvider;
pub use wanx::WanxProvider;
