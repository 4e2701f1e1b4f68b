use crate::error::EnvError;

pub type EnvResult<T> = Result<T, EnvError>;
