mod blocking;
mod channel;
mod connection;
mod heartbeat;
mod helper;
