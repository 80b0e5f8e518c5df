use error::*;

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("{field} is invalid: {reason}")]
#[code(Status::BadRequest)]
pub struct InvalidInput {
    pub field: String,
    pub reason: String,
}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("authentication is required")]
#[code(Status::Unauthorized)]
pub struct Unauthorized {}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("{action} is not permitted for this user")]
#[code(Status::Forbidden)]
pub struct Forbidden {
    pub action: String,
}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("{resource} '{name}' was not found")]
#[code(Status::NotFound)]
pub struct NotFound {
    pub resource: String,
    pub name: String,
}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("{reason}")]
#[code(Status::Conflict)]
pub struct Conflict {
    pub reason: String,
}

#[derive(Error, GenetError, HttpCode, Kind, Debug)]
#[error("quota exceeded: {resource} limit is {limit}")]
#[code(Status::Conflict)]
pub struct QuotaExceeded {
    pub resource: String,
    pub limit: u32,
}

impl NotFound {
    pub fn new<R: Into<String>, N: Into<String>>(resource: R, name: N) -> Self {
        Self {
            resource: resource.into(),
            name: name.into(),
        }
    }
}

impl InvalidInput {
    pub fn new<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
