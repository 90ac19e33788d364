// handlers/cars.rs - /cars and /cars/:car_id

use axum::extract::{
    multipart::{Field, MultipartRejection},
    rejection::{JsonRejection, PathRejection},
    Multipart, Path, State,
};
use axum::Json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{Car, CarPatch, FieldErrors, NewCar};
use crate::error::ApiError;
use crate::media::Picture;
use crate::middleware::{ApiResponse, ApiResult, BearerToken};

const TEXT_FIELDS: [&str; 2] = ["brand", "make"];
const NUMBER_FIELDS: [&str; 4] = ["year", "cm3", "km", "price"];

/// GET /cars - every listing, oldest first
pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Car>> {
    Ok(ApiResponse::success(state.cars.list().await?))
}

/// GET /cars/:car_id
pub async fn get(
    State(state): State<AppState>,
    car_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Car> {
    let id = parse_car_id(car_id)?;
    Ok(ApiResponse::success(state.cars.get(id).await?))
}

/**
 * POST /cars - create a listing from a multipart form
 *
 * Fields: brand, make, year, cm3, km, price and a `picture` file. The owner
 * is the bearer of the Authorization token; the stored `picture_url` is the
 * hosted copy of the uploaded file.
 */
pub async fn create(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Car> {
    // A bad credential is refused before the form is read
    state.auth.verify(&token)?;

    let multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (new_car, picture) = read_car_form(multipart).await?;

    let car = state.cars.create_with_picture(&token, new_car, picture).await?;
    Ok(ApiResponse::created(car))
}

/// PUT /cars/:car_id - sparse JSON update
pub async fn update(
    State(state): State<AppState>,
    car_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CarPatch>, JsonRejection>,
) -> ApiResult<Car> {
    let id = parse_car_id(car_id)?;
    let Json(patch) = payload.map_err(|e| ApiError::invalid_json(e.body_text()))?;
    Ok(ApiResponse::success(state.cars.update(id, patch).await?))
}

/// DELETE /cars/:car_id
pub async fn delete(
    State(state): State<AppState>,
    car_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<()> {
    let id = parse_car_id(car_id)?;
    state.cars.delete(id).await?;
    Ok(ApiResponse::<()>::no_content())
}

fn parse_car_id(car_id: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    car_id
        .map(|Path(id)| id)
        .map_err(|_| ApiError::bad_request("Car id must be a UUID"))
}

/// Read the car fields and the picture. Every missing or malformed field is
/// reported at once; range checks happen later in the service.
async fn read_car_form(mut multipart: Multipart) -> Result<(NewCar, Picture), ApiError> {
    let mut text: HashMap<String, String> = HashMap::new();
    let mut picture = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "picture" {
            picture = Some(read_picture(field).await?);
        } else if TEXT_FIELDS.contains(&name.as_str()) || NUMBER_FIELDS.contains(&name.as_str()) {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Unreadable field '{}': {}", name, e)))?;
            text.insert(name, value);
        }
    }

    let mut errors = FieldErrors::new();
    let mut take_text = |field: &str| match text.get(field).map(|v| v.trim()) {
        Some(value) => value.to_string(),
        None => {
            errors.insert(field.to_string(), "This field is required".to_string());
            String::new()
        }
    };
    let brand = take_text("brand");
    let make = take_text("make");

    let mut numbers = [0i32; 4];
    for (slot, field) in numbers.iter_mut().zip(NUMBER_FIELDS) {
        match text.get(field).map(|v| v.trim().parse::<i32>()) {
            Some(Ok(value)) => *slot = value,
            Some(Err(_)) => {
                errors.insert(field.to_string(), "must be an integer".to_string());
            }
            None => {
                errors.insert(field.to_string(), "This field is required".to_string());
            }
        }
    }
    let [year, cm3, km, price] = numbers;

    match &picture {
        None => {
            errors.insert("picture".to_string(), "This field is required".to_string());
        }
        Some(Picture { content_type, .. }) if !is_image(content_type.as_deref()) => {
            errors.insert("picture".to_string(), "must be an image file".to_string());
        }
        Some(_) => {}
    }

    match picture {
        Some(picture) if errors.is_empty() => Ok((
            NewCar {
                brand,
                make,
                year,
                cm3,
                km,
                price,
            },
            picture,
        )),
        _ => Err(ApiError::validation_error("Invalid form data", Some(errors))),
    }
}

async fn read_picture(field: Field<'_>) -> Result<Picture, ApiError> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable picture: {}", e)))?;

    Ok(Picture {
        file_name,
        content_type,
        data,
    })
}

// Clients that omit the part content type get the benefit of the doubt
fn is_image(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => ct.starts_with("image/") || ct == "application/octet-stream",
    }
}
