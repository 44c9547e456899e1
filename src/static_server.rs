use actix_web::{web, HttpResponse};
use mime_guess::from_path;
use rust_embed::RustEmbed;

use crate::core::errors::ApiError;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

pub async fn serve_static(path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let file_path = path.into_inner();

    let file = Assets::get(&file_path)
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", file_path)))?;

    let mime = from_path(&file_path).first_or_octet_stream();

    Ok(HttpResponse::Ok()
        .content_type(mime.as_ref())
        .insert_header(("Cache-Control", "public, max-age=3600"))
        .body(file.data.into_owned()))
}
