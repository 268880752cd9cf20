mod async_copy;
mod config;
mod device;
