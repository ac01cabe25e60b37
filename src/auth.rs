//! 上传凭据校验：查询参数令牌或 HTTP Basic 认证。

use axum::extract::Query;
use axum::http::{HeaderMap, HeaderValue, Uri, header};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};
use serde::Deserialize;

use crate::config::{AuthMode, UploadSettings};
use crate::error::ApiError;

/// 认证策略，由配置在启动时选定。
#[derive(Clone)]
pub enum Authenticator {
    Token {
        token: String,
    },
    Basic {
        username: String,
        password: String,
        realm: String,
    },
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl Authenticator {
    pub fn from_settings(upload: &UploadSettings) -> Self {
        match upload.auth_mode() {
            AuthMode::Token => Authenticator::Token {
                token: upload.token.clone().unwrap_or_default(),
            },
            AuthMode::Basic => Authenticator::Basic {
                username: upload.username.clone().unwrap_or_default(),
                password: upload.password.clone().unwrap_or_default(),
                realm: upload.realm.clone(),
            },
        }
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Authenticator::Token { .. } => AuthMode::Token,
            Authenticator::Basic { .. } => AuthMode::Basic,
        }
    }

    /// 校验请求凭据；缺失或格式错误一律视为未认证。
    pub fn authenticate(&self, uri: &Uri, headers: &HeaderMap) -> bool {
        match self {
            Authenticator::Token { token } => query_token(uri)
                .is_some_and(|presented| !presented.is_empty() && presented == *token),
            Authenticator::Basic {
                username, password, ..
            } => headers
                .typed_get::<Authorization<Basic>>()
                .is_some_and(|auth| auth.username() == username && auth.password() == password),
        }
    }

    /// 认证失败时的响应策略：令牌模式返回 400，Basic 模式返回 401 质询。
    pub fn rejection(&self) -> ApiError {
        match self {
            Authenticator::Token { .. } => {
                ApiError::BadRequest("Missing or invalid upload token".into())
            }
            Authenticator::Basic { realm, .. } => {
                let mut headers = HeaderMap::new();
                // 配置加载时已校验 realm，可直接放入引号内。
                if let Ok(value) = HeaderValue::from_str(&format!(r#"Basic realm="{realm}""#)) {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
                ApiError::Unauthorized(headers)
            }
        }
    }
}

fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn token_auth() -> Authenticator {
        Authenticator::Token {
            token: "s3cret".into(),
        }
    }

    fn basic_auth() -> Authenticator {
        Authenticator::Basic {
            username: "camera".into(),
            password: "pa:ss".into(),
            realm: "Image Upload".into(),
        }
    }

    fn uri(value: &str) -> Uri {
        value.parse().expect("valid uri")
    }

    #[test]
    fn token_must_match_exactly() {
        let auth = token_auth();
        let headers = HeaderMap::new();
        assert!(auth.authenticate(&uri("/up/site/cam?token=s3cret"), &headers));
        assert!(auth.authenticate(&uri("/up/site/cam?a=1&token=s3cret"), &headers));
        assert!(!auth.authenticate(&uri("/up/site/cam?token=S3CRET"), &headers));
        assert!(!auth.authenticate(&uri("/up/site/cam?token=s3cret2"), &headers));
        assert!(!auth.authenticate(&uri("/up/site/cam?token="), &headers));
        assert!(!auth.authenticate(&uri("/up/site/cam"), &headers));
    }

    #[test]
    fn token_is_percent_decoded() {
        let auth = Authenticator::Token {
            token: "a b&c".into(),
        };
        assert!(auth.authenticate(&uri("/?token=a%20b%26c"), &HeaderMap::new()));
    }

    #[test]
    fn token_mode_ignores_basic_header() {
        let mut headers = HeaderMap::new();
        headers.typed_insert(Authorization::basic("camera", "s3cret"));
        assert!(!token_auth().authenticate(&uri("/up"), &headers));
    }

    #[test]
    fn basic_credentials_must_match() {
        let auth = basic_auth();
        let target = uri("/up/site/cam");

        let mut valid = HeaderMap::new();
        valid.typed_insert(Authorization::basic("camera", "pa:ss"));
        assert!(auth.authenticate(&target, &valid));

        let mut wrong_password = HeaderMap::new();
        wrong_password.typed_insert(Authorization::basic("camera", "pass"));
        assert!(!auth.authenticate(&target, &wrong_password));

        let mut wrong_user = HeaderMap::new();
        wrong_user.typed_insert(Authorization::basic("Camera", "pa:ss"));
        assert!(!auth.authenticate(&target, &wrong_user));
    }

    #[test]
    fn basic_rejects_missing_or_malformed_header() {
        let auth = basic_auth();
        let target = uri("/up/site/cam?token=pa:ss");
        assert!(!auth.authenticate(&target, &HeaderMap::new()));

        for raw in ["Basic !!!not-base64", "Bearer abc", "Basic"] {
            let mut headers = HeaderMap::new();
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(raw));
            assert!(!auth.authenticate(&target, &headers), "{raw}");
        }
    }

    #[test]
    fn rejection_policy_follows_mode() {
        let token = token_auth().rejection().into_response();
        assert_eq!(token.status(), StatusCode::BAD_REQUEST);
        assert!(token.headers().get(header::WWW_AUTHENTICATE).is_none());

        let basic = basic_auth().rejection().into_response();
        assert_eq!(basic.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            basic.headers().get(header::WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static(r#"Basic realm="Image Upload""#))
        );
    }

    #[test]
    fn challenge_keeps_non_ascii_realm() {
        let auth = Authenticator::Basic {
            username: "camera".into(),
            password: "pa:ss".into(),
            realm: "Kamera Süd".into(),
        };
        let response = auth.rejection().into_response();
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .expect("challenge header");
        assert_eq!(challenge.as_bytes(), "Basic realm=\"Kamera Süd\"".as_bytes());
    }
}
