// Schema-tolerant extraction of (contract, token_id, price) out of an
// opaque contract-call parameter payload. Probes a small family of known
// shapes and gives up rather than guessing — a miss is a feature (the
// skipped-row counter), not a bug.

use serde_json::Value;

pub struct ListingParams {
    pub token_contract: String,
    pub token_id: String,
    pub price: Option<i64>,
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn try_direct(value: &Value) -> Option<ListingParams> {
    let token_contract = value
        .get("token_contract")
        .or_else(|| value.get("contract"))
        .and_then(value_to_string)?;
    let token_id = value.get("token_id").and_then(value_to_string)?;
    let price = value
        .get("price")
        .or_else(|| value.get("list_price"))
        .and_then(value_to_i64);
    Some(ListingParams { token_contract, token_id, price })
}

fn try_objkt_shape(value: &Value) -> Option<ListingParams> {
    let token_id = value.get("objkt_id").and_then(value_to_string)?;
    let token_contract = value
        .get("fa2")
        .or_else(|| value.get("token_contract"))
        .and_then(value_to_string)?;
    let price = value.get("xtz_per_objkt").and_then(value_to_i64);
    Some(ListingParams { token_contract, token_id, price })
}

pub fn extract_listing_params(value: &Value) -> Option<ListingParams> {
    if let Some(found) = try_direct(value) {
        return Some(found);
    }
    for key in ["ask", "listing"] {
        if let Some(nested) = value.get(key) {
            if let Some(found) = try_direct(nested) {
                return Some(found);
            }
        }
    }
    if let Some(first) = value.get("asks").and_then(|v| v.as_array()).and_then(|a| a.first()) {
        if let Some(found) = try_direct(first) {
            return Some(found);
        }
    }
    try_objkt_shape(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_direct_shape() {
        let v = json!({"token_contract": "KT1Coll", "token_id": "5", "price": 1000000});
        let p = extract_listing_params(&v).unwrap();
        assert_eq!(p.token_contract, "KT1Coll");
        assert_eq!(p.token_id, "5");
        assert_eq!(p.price, Some(1_000_000));
    }

    #[test]
    fn extracts_nested_ask_shape() {
        let v = json!({"ask": {"contract": "KT1Coll", "token_id": "7", "list_price": 2000000}});
        let p = extract_listing_params(&v).unwrap();
        assert_eq!(p.token_contract, "KT1Coll");
        assert_eq!(p.token_id, "7");
        assert_eq!(p.price, Some(2_000_000));
    }

    #[test]
    fn extracts_objkt_shape() {
        let v = json!({"objkt_id": "42", "fa2": "KT1Objkt", "xtz_per_objkt": "3000000", "editions": 1});
        let p = extract_listing_params(&v).unwrap();
        assert_eq!(p.token_contract, "KT1Objkt");
        assert_eq!(p.token_id, "42");
        assert_eq!(p.price, Some(3_000_000));
    }

    #[test]
    fn unrecognized_shape_returns_none() {
        let v = json!({"foo": "bar"});
        assert!(extract_listing_params(&v).is_none());
    }
}
