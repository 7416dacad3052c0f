pub mod key_codec;
pub mod object_store;
pub mod secret_store;
pub mod upload_gateway;
