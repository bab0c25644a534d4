use reqwest::StatusCode;
use thiserror::Error;

use crate::departments::Department;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("main agent error: {status} - {body}")]
    MainStatus { status: StatusCode, body: String },

    #[error("no readable stream found in response body")]
    MissingBody,

    #[error("{department} department error: {status}")]
    DepartmentStatus {
        department: Department,
        status: StatusCode,
    },

    #[error("{0} department response has no completion")]
    MissingCompletion(Department),
}
