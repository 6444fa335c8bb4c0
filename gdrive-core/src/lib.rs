mod batch;
mod client;
mod oauth;

pub use client::{
    ApiRequest, BATCH_LIMIT, BatchReply, DriveClient, DriveError, DriveItem, ErrorSignature,
    FOLDER_MIME_TYPE, FileList, FileUpload, ITEM_FIELDS,
};
pub use oauth::{DRIVE_SCOPE, OAuthClient, OAuthError, OAuthToken, OOB_REDIRECT_URI};

pub use reqwest::StatusCode;
