// Route modules for Callrelay Server
pub mod websocket; // Signaling WebSocket endpoint
