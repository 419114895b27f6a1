use serde::{Deserialize, Serialize};

use crate::models::{Message, User};

// -- Session --

/// Claims carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Forms --

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// `text` is optional on the wire so a missing field reaches the storage
/// layer and is rejected there instead of becoming a blank post.
#[derive(Debug, Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub header_image_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

// -- Views --

/// A message as rendered in a list: the message plus its author and
/// whether the viewer has liked it.
#[derive(Debug, Clone, Serialize)]
pub struct MessageCard {
    #[serde(flatten)]
    pub message: Message,
    pub author_username: String,
    pub author_image_url: String,
    /// `timestamp` formatted for display, e.g. "05 March 2024".
    pub posted_at: String,
    pub liked: bool,
}

/// A user in a list (search results, following, followers) with whether
/// the viewer already follows them.
#[derive(Debug, Clone, Serialize)]
pub struct UserCard {
    #[serde(flatten)]
    pub user: User,
    pub followed: bool,
}

/// Blank strings from HTML forms mean "not provided".
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
