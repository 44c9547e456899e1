use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::warn;

use crate::core::errors::{ApiError, ServiceError};
use crate::models::models::{FollowForm, LoginForm, PostForm, User};
use crate::service::Perch;
use crate::static_server::serve_static;
use crate::templates;

pub const SESSION_COOKIE: &str = "perch_session";

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub perch: Perch,
    pub secure_cookies: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/", web::post().to(login))
        .route("/post", web::get().to(post_form))
        .route("/post", web::post().to(create_post))
        .route("/follow", web::post().to(follow))
        .route("/unfollow", web::post().to(unfollow))
        .route("/logout", web::post().to(logout))
        .route("/health", web::get().to(health))
        .route("/static/{file:.*}", web::get().to(serve_static));
}

fn redirect_home() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .finish()
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Resolves the session cookie to a user. Unknown, expired or orphaned
/// sessions count as anonymous.
async fn current_user(state: &AppState, req: &HttpRequest) -> Result<Option<User>, ApiError> {
    let Some(cookie) = req.cookie(SESSION_COOKIE) else {
        return Ok(None);
    };

    let Some(session) = state.perch.sessions().resolve(cookie.value()).await? else {
        return Ok(None);
    };

    match state.perch.user(session.user_id).await {
        Ok(user) => Ok(Some(user)),
        Err(ServiceError::NotFound(_)) => {
            warn!(user_id = session.user_id, "Session points at unknown user");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn index(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    match current_user(&state, &req).await? {
        Some(user) => {
            let home = state.perch.home(user.id).await?;
            Ok(html(templates::render_home(&home)?))
        }
        None => Ok(html(templates::render_login(None)?)),
    }
}

/// Signup or login, decided by whether the username exists.
pub async fn login(
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    let outcome = match state.perch.authenticate(&form.username, &form.password).await {
        Ok(outcome) => outcome,
        Err(err @ (ServiceError::Validation(_) | ServiceError::IncorrectPassword)) => {
            let api: ApiError = err.into();
            let status = actix_web::ResponseError::status_code(&api);
            return Ok(HttpResponse::build(status)
                .content_type("text/html; charset=utf-8")
                .body(templates::render_login(Some(api.public_message()))?));
        }
        Err(err) => return Err(err.into()),
    };

    let sessions = state.perch.sessions();
    let token = sessions.create(outcome.user.id).await?;
    let ttl_secs = i64::try_from(sessions.ttl().as_secs()).unwrap_or(i64::MAX);
    let max_age = time::Duration::seconds(ttl_secs);
    let cookie = Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .max_age(max_age)
        .finish();

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(cookie)
        .finish())
}

pub async fn post_form(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let Some(user) = current_user(&state, &req).await? else {
        return Ok(redirect_home());
    };
    Ok(html(templates::render_post_form(
        &user,
        state.perch.max_message_len(),
    )?))
}

pub async fn create_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<PostForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(user) = current_user(&state, &req).await? else {
        return Ok(redirect_home());
    };
    state.perch.publish(user.id, &form.message).await?;
    Ok(redirect_home())
}

pub async fn follow(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<FollowForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(user) = current_user(&state, &req).await? else {
        return Ok(redirect_home());
    };
    state.perch.follow(user.id, &form.username).await?;
    Ok(redirect_home())
}

pub async fn unfollow(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<FollowForm>,
) -> Result<HttpResponse, ApiError> {
    let Some(user) = current_user(&state, &req).await? else {
        return Ok(redirect_home());
    };
    state.perch.unfollow(user.id, &form.username).await?;
    Ok(redirect_home())
}

pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        state.perch.sessions().destroy(cookie.value()).await?;
    }
    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(removal_cookie())
        .finish())
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "store": state.perch.store().backend_name(),
    }))
}
