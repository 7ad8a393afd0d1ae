use std::sync::Arc;

use async_trait::async_trait;
use postgate_core::clock::format_time;
use postgate_core::endpoint::{Call, Endpoint, EndpointDescriptor};
use postgate_core::ApiError;
use serde_json::{json, Value};

use crate::content::PostSource;

/// A single published post, addressed as `/post/<id>`.
#[derive(Debug)]
pub struct PostEndpoint {
    descriptor: EndpointDescriptor,
    posts: Arc<dyn PostSource>,
}

impl PostEndpoint {
    pub const ID: &'static str = "post";
    /// From this level on the post body is part of the answer.
    pub const FULL_DETAIL: u8 = 2;

    pub fn new(posts: Arc<dyn PostSource>) -> Self {
        Self {
            descriptor: EndpointDescriptor::new(Self::ID)
                .public()
                .level(Self::FULL_DETAIL),
            posts,
        }
    }
}

#[async_trait]
impl Endpoint for PostEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &Call<'_>) -> Result<Option<Value>, ApiError> {
        let id = call.request.arg(0);
        if id.is_empty() {
            return Err(ApiError::NotFound);
        }

        let Some(post) = self.posts.post(&call.request.tenant.id, id).await? else {
            return Err(ApiError::NotFound);
        };

        let mut content = json!({
            "id": post.id,
            "title": post.title,
            "url": post.url,
            "excerpt": post.excerpt,
            "author": post.author,
            "date": post.published_at.map(|d| format_time(d.timestamp())).unwrap_or_default(),
        });
        if self.descriptor.level >= Self::FULL_DETAIL {
            content["content"] = json!(post.content);
        }
        Ok(Some(content))
    }
}
