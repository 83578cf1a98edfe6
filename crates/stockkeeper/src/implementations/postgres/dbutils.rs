use crate::service::StoreError;

pub(crate) trait DBErrorHandler
where
    Self: ToString + Sized + Send + Sync + std::error::Error + 'static,
{
    fn into_store_error(self, message: impl Into<String>) -> StoreError;
}

impl DBErrorHandler for sqlx::Error {
    fn into_store_error(self, message: impl Into<String>) -> StoreError {
        match self {
            Self::Database(ref db) => {
                if db.is_unique_violation() {
                    return StoreError::Conflict(format!(
                        "{}: entity already exists",
                        message.into()
                    ));
                }
                match db.code().as_deref() {
                    // https://www.postgresql.org/docs/current/errcodes-appendix.html
                    Some(
                        "2D000" | "25000" | "25001" | "25P01" | "25P02" | "25P03" | "40000"
                        | "40001" | "40002" | "40003" | "40004",
                    ) => StoreError::Conflict("Concurrent modification failed.".to_string()),
                    _ => StoreError::backend(self),
                }
            }
            _ => StoreError::backend(self),
        }
    }
}
