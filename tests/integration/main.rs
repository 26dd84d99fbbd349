mod eviction;
mod reload;
mod streaming;
