//! Built-in operations exposed by the standalone server.

use analysis_rpc::{with_arity, HandlerError, HandlerResult, LogicalValue, NdArray, Result, RpcServer};
use tracing::debug;

/// Register every built-in operation on a bound server.
pub fn register_all(server: &mut RpcServer) -> Result<()> {
    server.add_handler("cat", with_arity(2, cat))?;
    server.add_handler("loopback", with_arity(1, loopback))?;
    server.add_handler("raise", with_arity(2, raise))?;
    server.add_handler("array_sum", with_arity(1, array_sum))?;
    server.add_handler("shape", with_arity(1, shape))?;

    debug!("Registered operations: {:?}", server.handlers().names());
    Ok(())
}

fn string_arg<'a>(
    args: &'a [LogicalValue],
    index: usize,
    name: &str,
) -> std::result::Result<&'a str, HandlerError> {
    args.get(index)
        .and_then(LogicalValue::as_str)
        .ok_or_else(|| HandlerError::type_error(format!("{} must be a string", name)))
}

fn array_arg<'a>(
    args: &'a [LogicalValue],
    name: &str,
) -> std::result::Result<&'a NdArray, HandlerError> {
    args.first()
        .and_then(LogicalValue::as_array)
        .ok_or_else(|| HandlerError::type_error(format!("{} must be an array", name)))
}

/// `cat(a, b)`: string concatenation.
fn cat(args: Vec<LogicalValue>) -> HandlerResult {
    let a = string_arg(&args, 0, "a")?;
    let b = string_arg(&args, 1, "b")?;
    Ok(LogicalValue::from(format!("{}{}", a, b)))
}

fn loopback(mut args: Vec<LogicalValue>) -> HandlerResult {
    Ok(args.swap_remove(0))
}

/// `raise(kind, message)`: always fails with the given kind and message.
fn raise(args: Vec<LogicalValue>) -> HandlerResult {
    let kind = string_arg(&args, 0, "kind")?;
    let message = string_arg(&args, 1, "message")?;
    Err(HandlerError::new(kind, message))
}

/// `array_sum(a)`: sum of all elements as a float.
fn array_sum(args: Vec<LogicalValue>) -> HandlerResult {
    let array = array_arg(&args, "a")?;
    let data = array.data();
    let total: f64 = (0..data.len()).filter_map(|i| data.get_f64(i)).sum();
    Ok(LogicalValue::from(total))
}

/// `shape(a)`: array shape as a sequence of ints.
fn shape(args: Vec<LogicalValue>) -> HandlerResult {
    let array = array_arg(&args, "a")?;
    let dims = array
        .shape()
        .iter()
        .map(|&d| {
            i64::try_from(d)
                .map(LogicalValue::from)
                .map_err(|_| HandlerError::value_error("dimension does not fit in an int"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(LogicalValue::from(dims))
}
