// Mark-as-read services
// Services shared by the contexts: storage, URL preprocessing, lookup, messaging and settings.

pub mod messaging;
pub mod read_state_index;
pub mod settings_surface;
pub mod store;
pub mod url_preprocessor;
