//! Drop-in replacements for axum's `Json`, `Query` and `Path` extractors
//! whose rejections are `AppError` values.
//!
//! Axum's stock extractors reject with plain-text bodies, which would make
//! malformed input the one place the admin API answers without its usual
//! `{"error", "details"}` envelope. Routing rejections through `AppError`
//! keeps every 4xx response the same shape.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::AppError;

macro_rules! deref_wrapper {
    ($name:ident) => {
        impl<T> std::ops::Deref for $name<T> {
            type Target = T;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<T> std::ops::DerefMut for $name<T> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

/// `axum::Json` with `AppError` rejections. Also usable as a response body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

deref_wrapper!(Json);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| Json(value))
            .map_err(AppError::from)
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// `axum::extract::Query` with `AppError` rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

deref_wrapper!(Query);

impl<S, T> FromRequestParts<S> for Query<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| Query(value))
            .map_err(AppError::from)
    }
}

/// `axum::extract::Path` with `AppError` rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct Path<T>(pub T);

deref_wrapper!(Path);

impl<S, T> FromRequestParts<S> for Path<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Path(value)| Path(value))
            .map_err(AppError::from)
    }
}
