use jsonrpsee::types::{ErrorCode, ErrorObject, ErrorObjectOwned};
use rn_common::db::StoreError;
use rn_sync::ApplyError;

/// Geth's code for rejected transactions
const SERVER_ERROR_CODE: i32 = -32000;

fn rpc_err_static(code: i32, msg: &'static str) -> ErrorObjectOwned {
    ErrorObject::borrowed(code, msg, None)
}
fn rpc_err_owned(code: i32, msg: String) -> ErrorObjectOwned {
    ErrorObject::owned(code, msg, None::<()>)
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed parsing raw transaction")]
    FailedParsing,
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RpcError> for ErrorObjectOwned {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::FailedParsing => {
                rpc_err_static(ErrorCode::ParseError.code(), "failed parsing raw transaction")
            }
            RpcError::Apply(err) => rpc_err_owned(SERVER_ERROR_CODE, err.to_string()),
            RpcError::Store(err) => rpc_err_owned(ErrorCode::InternalError.code(), err.to_string()),
        }
    }
}
