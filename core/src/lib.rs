/// Letterpost - animated letters shared as links
///
/// Letters travel entirely inside their share URL. This library holds the
/// URL codec, the animated text renderer, image compression and hosting,
/// the short-link service and client, and the local letter history.

pub mod error;
pub mod config;
pub mod letter;
pub mod markup;
pub mod render;
pub mod codec;
pub mod compress;
pub mod hosting;
pub mod shortlink;
pub mod shortlink_api;
pub mod shortlink_client;
pub mod history;
pub mod session;
pub mod cli_app;

pub use error::{LetterError, Result};
pub use config::Config;
pub use letter::{AnimationMode, ImageSlot, ImageSlotName, LetterDocument};
pub use session::EditingSession;
