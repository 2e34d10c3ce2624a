//! Shared port traits for covcomment's hexagonal architecture.
//!
//! Adapters implement these traits; the application layer depends only on
//! them. Errors cross the boundary as display strings.

use async_trait::async_trait;
use covcomment_types::Comment;

/// Port for the remote comment service.
///
/// These five operations are everything the publisher needs. Implementations
/// must not retry: each call is attempted at most once.
#[async_trait]
pub trait CommentApi: Send + Sync {
    /// Fetch one page (1-based) of comments on an issue or pull request.
    ///
    /// A page shorter than `per_page` marks the end of the list.
    async fn list_issue_comments(
        &self,
        issue_number: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Comment>, String>;

    /// Create a comment on an issue or pull request, returning its id.
    async fn create_issue_comment(&self, issue_number: u64, body: &str) -> Result<u64, String>;

    /// Replace the body of an existing comment.
    async fn update_issue_comment(&self, comment_id: u64, body: &str) -> Result<(), String>;

    /// Delete an existing comment.
    async fn delete_issue_comment(&self, comment_id: u64) -> Result<(), String>;

    /// Create a comment on a commit, returning its id.
    async fn create_commit_comment(&self, commit_sha: &str, body: &str) -> Result<u64, String>;
}

/// Port for reading report artifacts (JSON, XML) by path.
pub trait ArtifactReader {
    /// Read the whole artifact as UTF-8 text.
    fn read_artifact(&self, path: &str) -> Result<String, String>;
}
