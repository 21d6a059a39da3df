//! Utility functions for creating s3 clients
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;

pub const DEFAULT_REGION: &str = "us-east-1";

pub async fn client_from_profile(profile_name: &str, region: &str) -> Client {
    let base_config = aws_config::from_env()
        .profile_name(profile_name)
        .region(Region::new(region.to_string()))
        .load()
        .await;

    Client::new(&base_config)
}

/// Client for public buckets; it can list and read but not write.
pub async fn anon_client(region: &str) -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .no_credentials()
        .region(Region::new(region.to_string()))
        .load()
        .await;
    Client::new(&config)
}
