use std::sync::Arc;

use conform_dispatch::Dispatcher;

pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}
