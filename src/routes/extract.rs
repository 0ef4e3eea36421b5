//! Extractors whose rejections render as `AppError`, so malformed bodies,
//! queries and paths get the same `{ "error": ... }` JSON as every other
//! failure.

use axum::extract::{FromRequest, FromRequestParts};

use crate::types::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
