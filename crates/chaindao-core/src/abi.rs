//! ABI codec: calldata encoding, return decoding and log decoding.

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Event, Function};
use alloy_primitives::{Bytes, B256, U256};
use serde_json::{json, Value};

use crate::error::DaoError;
use crate::types::RawLog;

// ─── Calls ────────────────────────────────────────────────────────────────────

/// Encode `selector ++ params` for a function call.
pub fn encode_call(function: &Function, args: &[DynSolValue]) -> Result<Bytes, DaoError> {
    if args.len() != function.inputs.len() {
        return Err(DaoError::Abi(format!(
            "argument count mismatch for '{}': ABI has {}, got {}",
            function.name,
            function.inputs.len(),
            args.len()
        )));
    }
    for (i, (param, arg)) in function.inputs.iter().zip(args).enumerate() {
        let ty = param
            .resolve()
            .map_err(|e| DaoError::Abi(format!("param {i} of '{}': {e}", function.name)))?;
        if !ty.matches(arg) {
            return Err(DaoError::Abi(format!(
                "param '{}' of '{}' expects {ty}",
                param.name, function.name
            )));
        }
    }

    let mut calldata = function.selector().to_vec();
    calldata.extend_from_slice(&DynSolValue::Tuple(args.to_vec()).abi_encode_params());
    Ok(calldata.into())
}

/// Decode the return data of `function` into its output values.
pub fn decode_output(function: &Function, data: &[u8]) -> Result<Vec<DynSolValue>, DaoError> {
    if function.outputs.is_empty() {
        return Ok(vec![]);
    }
    let types = function
        .outputs
        .iter()
        .map(|p| p.resolve())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DaoError::Abi(format!("outputs of '{}': {e}", function.name)))?;
    decode_params(types, data)
}

/// Decode return data expecting exactly one output and return it.
pub fn decode_single_output(function: &Function, data: &[u8]) -> Result<DynSolValue, DaoError> {
    decode_output(function, data)?
        .into_iter()
        .next()
        .ok_or_else(|| DaoError::Abi(format!("'{}' returned no values", function.name)))
}

fn decode_params(types: Vec<DynSolType>, data: &[u8]) -> Result<Vec<DynSolValue>, DaoError> {
    let decoded = DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| DaoError::Abi(e.to_string()))?;
    match decoded {
        DynSolValue::Tuple(vals) => Ok(vals),
        other => Ok(vec![other]),
    }
}

// ─── Logs ─────────────────────────────────────────────────────────────────────

/// A log decoded against its event ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    /// Event name.
    pub event: String,
    /// Inputs in declaration order.
    pub fields: Vec<(String, DynSolValue)>,
}

impl DecodedLog {
    /// Value of the input called `name`.
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fields as a JSON object (numbers as decimal strings).
    pub fn to_json(&self) -> Value {
        let fields: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(n, v)| (n.clone(), value_to_json(v)))
            .collect();
        json!({ "event": self.event, "fields": fields })
    }
}

/// The topic that identifies `event` in logs.
pub fn event_topic(event: &Event) -> B256 {
    event.selector()
}

/// Decode a raw log against `event`.
///
/// Indexed inputs come from `topics[1..]` (dynamic indexed types are only
/// available as their keccak hash), the rest from `data`.
pub fn decode_log(event: &Event, log: &RawLog) -> Result<DecodedLog, DaoError> {
    let mut topics = log.topics.iter();
    if !event.anonymous {
        match topics.next() {
            Some(t) if *t == event.selector() => {}
            _ => {
                return Err(DaoError::Abi(format!(
                    "log at block {} is not a '{}' event",
                    log.block_number, event.name
                )))
            }
        }
    }

    let mut indexed = Vec::new();
    let mut body_types = Vec::new();
    for input in &event.inputs {
        let ty = input.resolve().map_err(|e| {
            DaoError::Abi(format!("input '{}' of '{}': {e}", input.name, event.name))
        })?;
        if input.indexed {
            let topic = topics.next().ok_or_else(|| {
                DaoError::Abi(format!("missing topic for indexed input '{}'", input.name))
            })?;
            let value = if is_hashed_in_topic(&ty) {
                DynSolValue::FixedBytes(*topic, 32)
            } else {
                ty.abi_decode(topic.as_slice())
                    .map_err(|e| DaoError::Abi(format!("topic '{}': {e}", input.name)))?
            };
            indexed.push(value);
        } else {
            body_types.push(ty);
        }
    }

    let body = if body_types.is_empty() {
        vec![]
    } else {
        decode_params(body_types, &log.data)?
    };

    let mut indexed = indexed.into_iter();
    let mut body = body.into_iter();
    let mut fields = Vec::with_capacity(event.inputs.len());
    for input in &event.inputs {
        let value = if input.indexed { indexed.next() } else { body.next() };
        let value = value
            .ok_or_else(|| DaoError::Abi(format!("missing value for '{}'", input.name)))?;
        fields.push((input.name.clone(), value));
    }

    Ok(DecodedLog {
        event: event.name.clone(),
        fields,
    })
}

fn is_hashed_in_topic(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(..)
            | DynSolType::Tuple(_)
    )
}

// ─── Value extraction ─────────────────────────────────────────────────────────

pub fn as_string(value: &DynSolValue) -> Result<String, DaoError> {
    match value {
        DynSolValue::String(s) => Ok(s.clone()),
        other => Err(unexpected("string", other)),
    }
}

pub fn as_uint(value: &DynSolValue) -> Result<U256, DaoError> {
    match value {
        DynSolValue::Uint(u, _) => Ok(*u),
        other => Err(unexpected("uint", other)),
    }
}

pub fn as_bool(value: &DynSolValue) -> Result<bool, DaoError> {
    match value {
        DynSolValue::Bool(b) => Ok(*b),
        other => Err(unexpected("bool", other)),
    }
}

/// Address as a checksummed `0x…` string.
pub fn as_address(value: &DynSolValue) -> Result<String, DaoError> {
    match value {
        DynSolValue::Address(a) => Ok(a.to_checksum(None)),
        other => Err(unexpected("address", other)),
    }
}

/// The meaningful bytes of a `bytesN` value.
pub fn as_fixed_bytes(value: &DynSolValue) -> Result<Vec<u8>, DaoError> {
    match value {
        DynSolValue::FixedBytes(word, size) => Ok(word[..*size].to_vec()),
        other => Err(unexpected("fixed bytes", other)),
    }
}

fn unexpected(expected: &str, got: &DynSolValue) -> DaoError {
    DaoError::Abi(format!("expected {expected}, got {got:?}"))
}

/// Render a value as JSON. Integers become decimal strings to keep precision.
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) | DynSolValue::Tuple(vals) => {
            Value::Array(vals.iter().map(value_to_json).collect())
        }
        _ => Value::Null,
    }
}
