use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

fn reject(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    let resp = HttpResponse::Unauthorized().json(json!({ "message": message }));
    req.into_response(resp.map_into_boxed_body())
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header_value = req
        .headers()
        .get("Authorization")
        .map(|h| h.to_str().map(str::to_owned));

    let header_value = match header_value {
        Some(Ok(v)) => v,
        Some(Err(_)) => return Ok(reject(req, "Invalid Authorization header encoding")),
        None => return Ok(reject(req, "Missing Authorization header")),
    };

    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return Ok(reject(req, "Authorization header must start with Bearer"));
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected token");
            return Ok(reject(req, "Invalid or expired token"));
        }
    };

    if claims.token_type != TokenType::Access {
        return Ok(reject(req, "Refresh tokens cannot be used for API access"));
    }

    let Some(role) = Role::from_id(claims.role) else {
        return Ok(reject(req, "Invalid role"));
    };

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    });

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_token};
    use actix_web::{App, HttpResponse, http::StatusCode, middleware::from_fn, test, web};

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.username)
    }

    fn token(token_type: TokenType, role: u8) -> String {
        let subject = TokenSubject {
            user_id: 1,
            username: "payroll.admin".into(),
            role,
            employee_id: None,
        };
        generate_token(&subject, token_type, &Config::for_tests().jwt_secret, 60)
            .unwrap()
            .0
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(Data::new(Config::for_tests()))
                    .service(
                        web::scope("/api")
                            .wrap(from_fn(auth_middleware))
                            .route("/me", web::get().to(whoami)),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_header_is_unauthorized() {
        let app = app!();
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn garbage_token_is_unauthorized() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Bearer not.a.jwt"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_token_is_not_an_access_token() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token(TokenType::Refresh, 1))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn unknown_role_is_unauthorized() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token(TokenType::Access, 99))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_access_token_reaches_handler() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {}", token(TokenType::Access, 1))))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "payroll.admin");
    }
}
