//! Prompt text sent to the chat completion endpoint.

/// System prompt for single-record normalization of material descriptions.
pub const SINGLE_RECORD_SYSTEM: &str = "\
You normalize raw materials-science data into English.

Rewrite the material description you are given as ONE concise, neutral, technical English sentence.

Rules:
- Never add or infer information that is not in the input.
- Keep chemical formulas exactly as written.
- Keep abbreviations as written (YSZ stays YSZ).
- Mention purity or concentration only when the input states it.
- Mention a supplier only when the input names one.
- Do not mention applications, performance or properties.
- Reply with the sentence only, without quotes.

Examples:
Input: YSZ，商品化材料(Toyo Soda)，>99%
Output: Commercial YSZ powder supplied by Toyo Soda with purity higher than 99%.

Input: Sc2O3, 商品化材料(Adventech, Korea)，6.8 mol%
Output: Commercial Sc2O3 powder supplied by Adventech (Korea) with a concentration of 6.8 mol%.";

/// System prompt for keyed batch translation of short method/route labels.
pub const BATCH_SYSTEM: &str = "\
You are a professional materials-science translator.
Translate each item's \"text\" to English.
- Keep the technical meaning.
- If an item is already English, return it unchanged.
- Return ONLY a JSON array of objects of the form {\"id\": <id>, \"text\": <translation>}.
- Every input id must appear exactly once in the output with its own translation.
- Do not invent ids and do not merge items.";

pub fn single_record_user(text: &str) -> String {
    format!("Input: {text}\nOutput:")
}

pub fn batch_user(items_json: &str) -> String {
    format!("Input JSON array:\n{items_json}")
}
