//! Endpoints this server adds on top of the built-in set.

use std::sync::Arc;

use postgate_core::RegistryBuilder;

use crate::content::PostSource;

pub mod post;
pub mod profile;

pub use post::PostEndpoint;
pub use profile::AuthoredPosts;

pub fn registry_builder(posts: Arc<dyn PostSource>) -> RegistryBuilder {
    RegistryBuilder::new()
        .contribute(Arc::new(PostEndpoint::new(posts.clone())))
        .profile_contributor(Arc::new(AuthoredPosts::new(posts)))
}
