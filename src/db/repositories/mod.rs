mod device_tokens;
mod notification_logs;
