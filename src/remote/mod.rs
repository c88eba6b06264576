pub mod elastic;
pub mod ytdlp;
