mod client;

pub use client::{
    Comment, CommentUser, ExportResponse, Item, RATE_LIMIT_ERROR_CODE, SessionHeaders,
    ShimoClient, ShimoError,
};
