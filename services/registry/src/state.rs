//! State handed to every request handler.

use std::sync::Arc;

use imgreg_pool::ImagePool;

/// Cheap-to-clone handle on the image pool, used as the router state.
#[derive(Clone)]
pub struct AppState {
    images: Arc<ImagePool>,
}

impl AppState {
    pub fn new(images: ImagePool) -> Self {
        Self {
            images: Arc::new(images),
        }
    }

    /// The pool every handler reads and mutates.
    pub fn images(&self) -> &ImagePool {
        &self.images
    }
}
