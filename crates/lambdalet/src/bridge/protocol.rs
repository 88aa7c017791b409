//! Wire message schema for the supervisor-to-worker request.
//!
//! Plain protobuf messages, derived directly so no build-time codegen is
//! needed. Tag numbers are fixed; new fields must take fresh tags so old
//! workers skip what they do not understand.

/// Self-describing request forwarded to the worker for one invocation.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AwsProxyRequest {
    /// Base64 text of the JSON-serialized invocation event.
    #[prost(bytes = "vec", tag = "1")]
    pub event: Vec<u8>,

    #[prost(message, optional, tag = "2")]
    pub context: Option<AwsLambdaContext>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AwsLambdaContext {
    #[prost(string, tag = "1")]
    pub function_name: String,
    #[prost(string, tag = "2")]
    pub function_version: String,
    #[prost(string, tag = "3")]
    pub invoked_function_arn: String,
    /// Stringly typed to match the runtime's context object.
    #[prost(string, tag = "4")]
    pub memory_limit_in_mb: String,
    #[prost(string, tag = "5")]
    pub aws_request_id: String,
    #[prost(string, tag = "6")]
    pub log_group_name: String,
    #[prost(string, tag = "7")]
    pub log_stream_name: String,

    #[prost(message, optional, tag = "8")]
    pub identity: Option<AwsCognitoIdentity>,
    #[prost(message, optional, tag = "9")]
    pub client_context: Option<AwsClientContext>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AwsCognitoIdentity {
    #[prost(string, tag = "1")]
    pub cognito_identity_id: String,
    #[prost(string, tag = "2")]
    pub cognito_identity_pool_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AwsClientContext {
    #[prost(string, tag = "1")]
    pub installation_id: String,
    #[prost(string, tag = "2")]
    pub app_title: String,
    #[prost(string, tag = "3")]
    pub app_version_name: String,
    #[prost(string, tag = "4")]
    pub app_version_code: String,
    #[prost(string, tag = "5")]
    pub app_package_name: String,

    #[prost(message, optional, tag = "6")]
    pub env: Option<AwsClientContextEnv>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AwsClientContextEnv {
    #[prost(string, tag = "1")]
    pub platform_version: String,
    #[prost(string, tag = "2")]
    pub platform: String,
    #[prost(string, tag = "3")]
    pub make: String,
    #[prost(string, tag = "4")]
    pub model: String,
    #[prost(string, tag = "5")]
    pub locale: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn request_round_trips() {
        let request = AwsProxyRequest {
            event: b"eyJhIjoxfQ==".to_vec(),
            context: Some(AwsLambdaContext {
                function_name: "EchoFunction".to_string(),
                function_version: "[LATEST]".to_string(),
                invoked_function_arn: "arn:aws:lambda:us-west-2:1234:function:EchoFunction"
                    .to_string(),
                memory_limit_in_mb: "128".to_string(),
                aws_request_id: "req-1".to_string(),
                log_group_name: "/aws/lambda/EchoFunction".to_string(),
                log_stream_name: "stream".to_string(),
                identity: None,
                client_context: None,
            }),
        };

        let bytes = request.encode_to_vec();
        let decoded = AwsProxyRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn absent_submessages_decode_as_none() {
        let request = AwsProxyRequest {
            event: Vec::new(),
            context: Some(AwsLambdaContext::default()),
        };
        let decoded = AwsProxyRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        let context = decoded.context.unwrap();
        assert!(context.identity.is_none());
        assert!(context.client_context.is_none());
    }

    #[test]
    fn unknown_tags_are_skipped() {
        // A future writer appends field 15 (varint); today's reader ignores it.
        let mut bytes = AwsProxyRequest {
            event: b"payload".to_vec(),
            context: None,
        }
        .encode_to_vec();
        bytes.extend_from_slice(&[0x78, 0x2a]); // tag 15, varint 42

        let decoded = AwsProxyRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.event, b"payload");
    }
}
