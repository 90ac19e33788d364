use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::link::Link;
use crate::database::manager::DatabaseError;
use crate::database::models::user::User;
use crate::database::repository::{Document, LinkedDocument};
use crate::database::store::Collection;

/// Per-field validation messages, keyed by field name
pub type FieldErrors = HashMap<String, String>;

/// A vehicle listing owned by the user who created it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: Option<Uuid>,
    pub brand: String,
    pub make: String,
    pub year: i32,
    /// Engine displacement in cm³
    pub cm3: i32,
    /// Mileage in km
    pub km: i32,
    pub price: i32,
    pub picture_url: String,
    pub user: Link<User>,
}

impl Document for Car {
    const COLLECTION: Collection = Collection::Cars;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn linked_documents(&self) -> Result<Vec<LinkedDocument>, DatabaseError> {
        Ok(self.user.to_linked_document()?.into_iter().collect())
    }
}

/// Submitted attributes of a car, before it has a picture or an owner
#[derive(Debug, Clone, PartialEq)]
pub struct NewCar {
    pub brand: String,
    pub make: String,
    pub year: i32,
    pub cm3: i32,
    pub km: i32,
    pub price: i32,
}

impl NewCar {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "brand", &self.brand);
        check_text(&mut errors, "make", &self.make);
        check_year(&mut errors, self.year);
        check_range(&mut errors, "cm3", self.cm3, CM3_RANGE);
        check_range(&mut errors, "km", self.km, KM_RANGE);
        check_range(&mut errors, "price", self.price, PRICE_RANGE);
        into_result(errors)
    }

    pub fn into_car(self, picture_url: String, user: Link<User>) -> Car {
        Car {
            id: None,
            brand: self.brand,
            make: self.make,
            year: self.year,
            cm3: self.cm3,
            km: self.km,
            price: self.price,
            picture_url,
            user,
        }
    }
}

/// Sparse update. Absent and `null` fields both arrive as `None` and are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CarPatch {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub cm3: Option<i32>,
    #[serde(default)]
    pub km: Option<i32>,
    #[serde(default)]
    pub price: Option<i32>,
}

impl CarPatch {
    pub fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.make.is_none()
            && self.year.is_none()
            && self.cm3.is_none()
            && self.km.is_none()
            && self.price.is_none()
    }

    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(brand) = &self.brand {
            check_text(&mut errors, "brand", brand);
        }
        if let Some(make) = &self.make {
            check_text(&mut errors, "make", make);
        }
        if let Some(year) = self.year {
            check_year(&mut errors, year);
        }
        if let Some(cm3) = self.cm3 {
            check_range(&mut errors, "cm3", cm3, CM3_RANGE);
        }
        if let Some(km) = self.km {
            check_range(&mut errors, "km", km, KM_RANGE);
        }
        if let Some(price) = self.price {
            check_range(&mut errors, "price", price, PRICE_RANGE);
        }
        into_result(errors)
    }

    /// The present fields as a document fragment for `merge_update`
    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(brand) = self.brand {
            fields.insert("brand".to_string(), Value::from(brand.trim()));
        }
        if let Some(make) = self.make {
            fields.insert("make".to_string(), Value::from(make.trim()));
        }
        let numbers = [
            ("year", self.year),
            ("cm3", self.cm3),
            ("km", self.km),
            ("price", self.price),
        ];
        for (name, value) in numbers {
            if let Some(value) = value {
                fields.insert(name.to_string(), Value::from(value));
            }
        }
        fields
    }
}

// Exclusive bounds
const YEAR_MIN: i32 = 1970;
const CM3_RANGE: (i32, i32) = (0, 5000);
const KM_RANGE: (i32, i32) = (0, 500_000);
const PRICE_RANGE: (i32, i32) = (0, 100_000);

fn check_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.insert(field.to_string(), "must not be empty".to_string());
    }
}

fn check_year(errors: &mut FieldErrors, year: i32) {
    // Next year's models are listed before the calendar turns
    let latest = Utc::now().year() + 1;
    if year <= YEAR_MIN || year > latest {
        errors.insert(
            "year".to_string(),
            format!("must be after {} and no later than {}", YEAR_MIN, latest),
        );
    }
}

fn check_range(errors: &mut FieldErrors, field: &str, value: i32, (min, max): (i32, i32)) {
    if value <= min || value >= max {
        errors.insert(
            field.to_string(),
            format!("must be greater than {} and less than {}", min, max),
        );
    }
}

fn into_result(errors: FieldErrors) -> Result<(), FieldErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
