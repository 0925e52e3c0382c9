use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use beeline_client::ClientError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// An application-logic failure; mapped onto a status by taxonomy.
    #[error(transparent)]
    App(#[from] ClientError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::App(inner) => match inner {
                ClientError::Unauthenticated | ClientError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                }
                ClientError::Forbidden
                | ClientError::RegistrationClosed
                | ClientError::SelfInvite => StatusCode::FORBIDDEN,
                ClientError::NotFound | ClientError::UserNotFound => StatusCode::NOT_FOUND,
                ClientError::EmailTaken
                | ClientError::UsernameTaken
                | ClientError::RequestExists
                | ClientError::AlreadyContacts
                | ClientError::NotContacts
                | ClientError::InviteRedeemed
                | ClientError::InvalidState => StatusCode::CONFLICT,
                ClientError::SelfRequest
                | ClientError::Validation(_)
                | ClientError::InviteToken(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ClientError::InviteExpired => StatusCode::GONE,
                ClientError::PasswordHash
                | ClientError::LockPoisoned
                | ClientError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal failure details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (ClientError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ClientError::Forbidden, StatusCode::FORBIDDEN),
            (ClientError::UserNotFound, StatusCode::NOT_FOUND),
            (ClientError::RequestExists, StatusCode::CONFLICT),
            (ClientError::InviteRedeemed, StatusCode::CONFLICT),
            (ClientError::SelfRequest, StatusCode::UNPROCESSABLE_ENTITY),
            (ClientError::InviteExpired, StatusCode::GONE),
            (ClientError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ServerError::App(error).status(), expected);
        }
    }
}
