mod cosine_similarity;
pub use cosine_similarity::cosine_similarity;

mod embed;
pub use embed::{EMBEDDING_DIM, Embedder, OpenAiEmbedder};

mod chat;
pub use chat::{ChatMessage, ChatModel, ChatRole, OpenAiChat};
