use miette::Diagnostic;
use thiserror::Error;

use crate::authz::identity::AuthnError;
use crate::authz::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("Database error: {0}")]
    #[diagnostic(
        code(rolegate::db),
        help("Check `database.url` and that the database is reachable")
    )]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] AuthnError),

    #[error("Bad request: {0}")]
    #[diagnostic(code(rolegate::bad_request))]
    BadRequest(String),
}
