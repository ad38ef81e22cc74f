pub mod app_user;
pub mod comment;
pub mod notification;
pub mod post;
pub mod report;
