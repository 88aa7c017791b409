//! Request codec: invocation event + context -> wire message bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use prost::Message;

use crate::bridge::protocol::{
    AwsClientContext, AwsClientContextEnv, AwsCognitoIdentity, AwsLambdaContext, AwsProxyRequest,
};
use crate::context::LambdaContext;

/// Best-effort JSON coercion of a textual `body` field.
///
/// Gateway integration templates deliver the request body as a string; when
/// it parses as JSON, replace it in place so the worker sees structured data.
/// Any parse failure keeps the original string untouched. Never fails.
pub fn coerce_body(event: &mut serde_json::Value) {
    let Some(body) = event.get("body").and_then(|b| b.as_str()) else {
        return;
    };
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        event["body"] = parsed;
    }
}

/// Build the serialized wire message for one forwarding attempt.
///
/// The message is constructed fresh per attempt and discarded after send.
pub fn encode_request(mut event: serde_json::Value, context: &LambdaContext) -> Vec<u8> {
    coerce_body(&mut event);

    // Value serialization cannot fail; fall back to the literal just in case.
    let serialized = serde_json::to_string(&event).unwrap_or_else(|_| event.to_string());

    let request = AwsProxyRequest {
        event: BASE64.encode(serialized.as_bytes()).into_bytes(),
        context: Some(encode_context(context)),
    };
    request.encode_to_vec()
}

fn encode_context(context: &LambdaContext) -> AwsLambdaContext {
    AwsLambdaContext {
        function_name: context.function_name.clone(),
        function_version: context.function_version.clone(),
        invoked_function_arn: context.invoked_function_arn.clone(),
        memory_limit_in_mb: context.memory_limit_in_mb.clone(),
        aws_request_id: context.aws_request_id.clone(),
        log_group_name: context.log_group_name.clone(),
        log_stream_name: context.log_stream_name.clone(),
        identity: context.identity.as_ref().map(|identity| AwsCognitoIdentity {
            cognito_identity_id: identity.cognito_identity_id.clone(),
            cognito_identity_pool_id: identity.cognito_identity_pool_id.clone(),
        }),
        client_context: context.client_context.as_ref().map(|cc| AwsClientContext {
            installation_id: cc.installation_id.clone(),
            app_title: cc.app_title.clone(),
            app_version_name: cc.app_version_name.clone(),
            app_version_code: cc.app_version_code.clone(),
            app_package_name: cc.app_package_name.clone(),
            env: cc.env.as_ref().map(|env| AwsClientContextEnv {
                platform_version: env.platform_version.clone(),
                platform: env.platform.clone(),
                make: env.make.clone(),
                model: env.model.clone(),
                locale: env.locale.clone(),
            }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ClientContext, ClientContextEnv, CognitoIdentity};
    use serde_json::json;

    fn decode_event(bytes: &[u8]) -> serde_json::Value {
        let request = AwsProxyRequest::decode(bytes).unwrap();
        let decoded = BASE64.decode(request.event).unwrap();
        serde_json::from_slice(&decoded).unwrap()
    }

    fn test_context() -> LambdaContext {
        LambdaContext {
            aws_request_id: "req-1".to_string(),
            function_name: "EchoFunction".to_string(),
            function_version: "[LATEST]".to_string(),
            invoked_function_arn: "arn:aws:lambda:us-west-2:1234:function:EchoFunction"
                .to_string(),
            memory_limit_in_mb: "128".to_string(),
            log_group_name: "/aws/lambda/EchoFunction".to_string(),
            log_stream_name: "2016/10/05/[$LATEST]abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn json_body_is_coerced_in_place() {
        let mut event = json!({"body": "{\"a\":1}"});
        coerce_body(&mut event);
        assert_eq!(event, json!({"body": {"a": 1}}));
    }

    #[test]
    fn non_json_body_passes_through_unchanged() {
        let mut event = json!({"body": "plain text, not json"});
        coerce_body(&mut event);
        assert_eq!(event, json!({"body": "plain text, not json"}));
    }

    #[test]
    fn missing_body_is_a_no_op() {
        let mut event = json!({"queryParams": {}});
        coerce_body(&mut event);
        assert_eq!(event, json!({"queryParams": {}}));
    }

    #[test]
    fn encoded_event_round_trips_through_base64() {
        let bytes = encode_request(json!({"body": "{\"a\":1}"}), &test_context());
        assert_eq!(decode_event(&bytes), json!({"body": {"a": 1}}));
    }

    #[test]
    fn context_fields_land_on_the_wire() {
        let mut context = test_context();
        context.identity = Some(CognitoIdentity {
            cognito_identity_id: "id-1".to_string(),
            cognito_identity_pool_id: "pool-1".to_string(),
        });
        context.client_context = Some(ClientContext {
            installation_id: "install-1".to_string(),
            app_title: "Demo".to_string(),
            env: Some(ClientContextEnv {
                platform: "Android".to_string(),
                locale: "en_US".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });

        let bytes = encode_request(json!({}), &context);
        let request = AwsProxyRequest::decode(bytes.as_slice()).unwrap();
        let wire = request.context.unwrap();

        assert_eq!(wire.function_name, "EchoFunction");
        assert_eq!(wire.memory_limit_in_mb, "128");
        assert_eq!(wire.identity.unwrap().cognito_identity_pool_id, "pool-1");
        let cc = wire.client_context.unwrap();
        assert_eq!(cc.installation_id, "install-1");
        assert_eq!(cc.env.unwrap().platform, "Android");
    }

    #[test]
    fn optional_blocks_are_omitted_when_absent() {
        let bytes = encode_request(json!({}), &test_context());
        let request = AwsProxyRequest::decode(bytes.as_slice()).unwrap();
        let wire = request.context.unwrap();
        assert!(wire.identity.is_none());
        assert!(wire.client_context.is_none());
    }
}
