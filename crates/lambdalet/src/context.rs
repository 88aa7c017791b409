//! Execution context carried alongside each invocation event.
//!
//! Mirrors the JSON shapes the serverless runtime hands to the entrypoint:
//! the context object itself is camelCase, while the mobile client context
//! (and its env block) arrive in snake_case.

use serde::{Deserialize, Serialize};

/// Per-invocation execution context.
///
/// Core identity fields are always present on a real invocation; the
/// caller-identity and client-metadata blocks only exist for invocations
/// routed through an identity pool or a mobile SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaContext {
    pub aws_request_id: String,
    pub function_name: String,
    pub function_version: String,
    pub invoked_function_arn: String,
    /// Stringly typed upstream; forwarded verbatim. The runtime spells the
    /// key `memoryLimitInMB`, which camelCase inference does not produce.
    #[serde(rename = "memoryLimitInMB")]
    pub memory_limit_in_mb: String,
    pub log_group_name: String,
    pub log_stream_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<CognitoIdentity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_context: Option<ClientContext>,

    /// Remaining time budget at the moment the invocation entered the
    /// supervisor. Informational metadata for metrics only; it is captured
    /// once per invocation and never re-read on a respawn retry, and it is
    /// not part of the wire message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time_in_millis: Option<u64>,
}

/// Caller identity for invocations authenticated through an identity pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitoIdentity {
    pub cognito_identity_id: String,
    pub cognito_identity_pool_id: String,
}

/// Client metadata set by mobile SDK callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientContext {
    #[serde(default)]
    pub installation_id: String,
    #[serde(default)]
    pub app_title: String,
    #[serde(default)]
    pub app_version_name: String,
    #[serde(default)]
    pub app_version_code: String,
    #[serde(default)]
    pub app_package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<ClientContextEnv>,
}

/// Device environment block of the client context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientContextEnv {
    #[serde(default)]
    pub platform_version: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub locale: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_deserializes_camel_case() {
        let ctx: LambdaContext = serde_json::from_value(serde_json::json!({
            "awsRequestId": "12341234-1234-1234-1234-123412341234",
            "functionName": "EchoFunction",
            "functionVersion": "[LATEST]",
            "invokedFunctionArn": "arn:aws:lambda:us-west-2:123412341234:function:EchoFunction",
            "memoryLimitInMB": "128",
            "logGroupName": "/aws/lambda/EchoFunction",
            "logStreamName": "2016/10/05/[$LATEST]abc",
        }))
        .unwrap();

        assert_eq!(ctx.function_name, "EchoFunction");
        assert_eq!(ctx.memory_limit_in_mb, "128");
        assert!(ctx.identity.is_none());
        assert!(ctx.client_context.is_none());
    }

    #[test]
    fn memory_limit_uses_the_runtime_key_case() {
        let ctx = LambdaContext {
            memory_limit_in_mb: "256".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["memoryLimitInMB"], "256");
        assert!(json.get("memoryLimitInMb").is_none());

        let back: LambdaContext = serde_json::from_value(json).unwrap();
        assert_eq!(back.memory_limit_in_mb, "256");
    }

    #[test]
    fn client_context_deserializes_snake_case() {
        let ctx: ClientContext = serde_json::from_value(serde_json::json!({
            "installation_id": "install-1",
            "app_title": "Demo",
            "app_version_name": "1.2",
            "app_version_code": "12",
            "app_package_name": "com.example.demo",
            "env": {
                "platform_version": "10",
                "platform": "Android",
                "make": "Acme",
                "model": "Phone",
                "locale": "en_US",
            },
        }))
        .unwrap();

        assert_eq!(ctx.installation_id, "install-1");
        assert_eq!(ctx.env.unwrap().platform, "Android");
    }

    #[test]
    fn identity_round_trips() {
        let identity = CognitoIdentity {
            cognito_identity_id: "id-1".to_string(),
            cognito_identity_pool_id: "pool-1".to_string(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["cognitoIdentityId"], "id-1");
        assert_eq!(
            serde_json::from_value::<CognitoIdentity>(json).unwrap(),
            identity
        );
    }
}
