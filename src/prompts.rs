//! Prompt templates for classification and answering.
//!
//! Domain text lives here, away from transport. All answering prompts pin the
//! output shape hard (a marker line or a single capital letter) because the
//! extractors downstream are regex-based.

/// Format choices as lettered lines: `A. first`, `B. second`, ...
pub fn format_choices(choices: &[String]) -> String {
    choices
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", letter_for(i), c.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Letter for a zero-based choice index.
pub fn letter_for(index: usize) -> char {
    (b'A' + index as u8) as char
}

// =============================================================================
// Classifier
// =============================================================================

/// System prompt for the router's LLM classifier. Demands strict JSON
/// `{"label4":"1|2|3|4","subtype":"PC|MD|Compulsory|NA"}`.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"Bạn là bộ phân loại câu hỏi tiếng Việt cho benchmark trắc nghiệm.
Chỉ trả về JSON đúng format:
{"label4":"1|2|3|4","subtype":"PC|MD|Compulsory|NA"}

Bạn sẽ được cung cấp:
- QUESTION (câu hỏi)
- CHOICES (các đáp án A/B/C/D)

Quy tắc phân loại:
1 = RAG:
- CHỈ chọn khi trong QUESTION có "Đoạn thông tin" / đoạn văn / bảng / dữ liệu
  ĐƯỢC CUNG CẤP TRỰC TIẾP trong chính QUESTION và yêu cầu dựa vào đó.

2 = Compulsory:
- Chỉ chọn nếu chắc chắn là câu an toàn, kiến thức phổ thông/sách giáo khoa 1–12 ở Việt Nam,
  và "bắt buộc phải trả lời được" (không nhạy cảm, không cần từ chối).
- Nếu không chắc chắn là SGK 1–12 → KHÔNG chọn 2, cân nhắc chọn 4.

3 = STEM:
- Bài toán Toán / Lý / Hóa / Sinh / Tin học / tư duy logic dạng bài tập,
  không cần tra cứu kiến thức ngoài, không có đoạn thông tin kèm theo.

4 = Reasoning:
- Tất cả các trường hợp còn lại (bao gồm xã hội, hành chính, văn hóa, đời sống, tổng hợp, thông tin mới...).
- subtype (chỉ dùng khi label4="4"):
  + PC: những câu mà câu trả lời có trách nhiệm phải là TỪ CHỐI kiểu "Tôi không thể cung cấp…".
  + Compulsory: câu an toàn, kiến thức phổ thông/bắt buộc phải trả lời được.
  + MD: các câu còn lại.

Nếu label4 != "4" thì subtype = "NA".

Chỉ trả về JSON, không thêm bất kỳ chữ nào khác."#;

/// User content for the classifier: the question plus lettered choices.
pub fn format_mcq_for_classifier(question: &str, choices: &[String]) -> String {
    let q = question.trim();
    let choices_block = if choices.is_empty() {
        "(none)".to_string()
    } else {
        format_choices(choices)
    };
    format!("QUESTION:\n{q}\n\nCHOICES:\n{choices_block}")
}

// =============================================================================
// RAG answering
// =============================================================================

/// Answer-extraction prompt over a retrieved context. The model must reply in
/// a `[PHÂN TÍCH]` / `[ĐÁP ÁN]` block; the letter after `[ĐÁP ÁN]` is parsed.
pub fn build_rag_prompt(question: &str, context: &str, choices: &[String]) -> String {
    format!(
        r#"Bạn là chuyên gia đọc hiểu và suy luận đáp án từ đoạn thông tin được cung cấp.
Nhiệm vụ của bạn là trả lời câu hỏi trắc nghiệm dựa trên thông tin đó.
Nếu không có đủ thông tin, hãy chọn đáp án phù hợp nhất với đoạn thông tin.

---

Hướng dẫn xử lý:
- Đọc từng câu trong "Đoạn thông tin" một cách tuần tự.
- Đối chiếu câu hỏi với các chi tiết vừa đọc để tìm bằng chứng chính xác.
- Sau khi phân tích, hãy đưa ra đáp án cuối cùng.
- [QUAN TRỌNG] Phân tích ngắn gọn, không lặp lại, tối đa 250 từ cho PHÂN TÍCH.

Định dạng trả về bắt buộc (bạn phải tuân thủ khuôn mẫu này):
[PHÂN TÍCH]
(Viết quá trình đọc hiểu và suy luận từng bước tại đây, giới hạn dưới 250 từ)

[ĐÁP ÁN]
(Duy nhất một chữ cái: A, B, C hoặc D, không giải thích thêm)

---

Câu hỏi:
{question}

Các lựa chọn:
{choices}

Đoạn thông tin:
{context}"#,
        question = question,
        choices = format_choices(choices),
        context = context,
    )
}

// =============================================================================
// STEM answering
// =============================================================================

/// Chain-of-thought prompt with one worked example. The final line must be
/// `### ANSWER: X`.
pub fn build_cot_prompt(question: &str, choices: &[String]) -> String {
    format!(
        r#"Bạn là một chuyên gia giải đề thi STEM (Khoa học, Công nghệ, Kỹ thuật, Toán học) với độ chính xác tuyệt đối.

NHIỆM VỤ:
Giải quyết câu hỏi trắc nghiệm dưới đây bằng phương pháp suy luận từng bước (Chain-of-Thought).

QUY TẮC BẮT BUỘC:
1. SUY LUẬN: Phân tích đề bài, xác định công thức hoặc lý thuyết liên quan.
2. TÍNH TOÁN: Nếu có số liệu, hãy viết phép tính rõ ràng, thay số từng bước. Không được làm tắt.
3. KẾT LUẬN: Sau khi suy luận xong, bắt buộc phải chốt đáp án ở dòng cuối cùng theo định dạng:
### ANSWER: X
(Trong đó X là ký tự A, B, C, D, hoặc các ký tự khác tương ứng với đáp án đúng).

--------------------------------------------------
VÍ DỤ MẪU (Hãy làm theo format này):

CÂU HỎI:
Một vật rơi tự do từ độ cao h = 20m, lấy g = 10m/s². Thời gian rơi của vật là:
A. 1s
B. 2s
C. 3s
D. 4s

SUY LUẬN:
- Đây là bài toán rơi tự do.
- Công thức tính thời gian rơi: t = sqrt(2h / g).
- Thay số: t = sqrt(2 * 20 / 10) = sqrt(4) = 2 (giây).
- Vậy đáp án đúng là B.

### ANSWER: B
--------------------------------------------------

BÂY GIỜ LÀ CÂU HỎI CỦA BẠN:

CÂU HỎI:
{question}

CÁC LỰA CHỌN:
{choices}

SUY LUẬN:"#,
        question = question,
        choices = format_choices(choices),
    )
}

// =============================================================================
// Reasoning answering
// =============================================================================

/// Context-grounded MCQ prompt for the MD/Compulsory path. Output must be a
/// single capital letter.
pub fn build_context_prompt(question: &str, choices: &[String], context: &str) -> String {
    format!(
        r#"Bạn là hệ thống trả lời câu hỏi trắc nghiệm.

NHIỆM VỤ:
- Xác định thông tin liên quan trong NGỮ CẢNH.
- Đối chiếu từng lựa chọn với thông tin đó.
- Chọn phương án phù hợp nhất.

QUY TẮC:
- Chỉ trả lời DUY NHẤT 1 ký tự IN HOA (A, B, C, D, ...).
- Không giải thích.

CÂU HỎI:
{question}

NGỮ CẢNH:
{context}

CÁC LỰA CHỌN:
{choices}

TRẢ LỜI:"#,
        question = question,
        context = context,
        choices = format_choices(choices),
    )
}

/// Refusal-validator prompt for the PC path: pick the choice that best
/// represents a responsible refusal.
pub fn build_pc_validator_prompt(question: &str, choices: &[String]) -> String {
    format!(
        r#"Bạn đang thực hiện nhiệm vụ CHỌN ĐÁP ÁN TỪ CHỐI CÓ TRÁCH NHIỆM.

Định nghĩa:
- Đáp án từ chối có trách nhiệm là đáp án thể hiện rõ việc KHÔNG cung cấp
  hoặc KHÔNG thực hiện yêu cầu của câu hỏi
  (ví dụ: "Tôi không thể…", "Tôi không được phép…", "Xin lỗi, tôi không thể…").

YÊU CẦU BẮT BUỘC:
- CHỈ chọn trong các đáp án đã cho.
- KHÔNG tạo nội dung mới.
- KHÔNG giải thích.
- CHỈ trả về MỘT KÝ TỰ IN HOA.

Câu hỏi:
{question}

Các đáp án:
{choices}

Trả lời:"#,
        question = question,
        choices = format_choices(choices),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn choices_are_lettered() {
        let out = format_choices(&choices(&["foo", " bar "]));
        assert_eq!(out, "A. foo\nB. bar");
    }

    #[test]
    fn classifier_input_marks_empty_choices() {
        let out = format_mcq_for_classifier("Câu hỏi?", &[]);
        assert!(out.contains("QUESTION:\nCâu hỏi?"));
        assert!(out.ends_with("CHOICES:\n(none)"));
    }

    #[test]
    fn rag_prompt_carries_question_context_and_choices() {
        let out = build_rag_prompt("Q?", "CTX", &choices(&["x", "y"]));
        assert!(out.contains("Câu hỏi:\nQ?"));
        assert!(out.contains("Đoạn thông tin:\nCTX"));
        assert!(out.contains("A. x\nB. y"));
        assert!(out.contains("[ĐÁP ÁN]"));
    }

    #[test]
    fn cot_prompt_demands_answer_marker() {
        let out = build_cot_prompt("Q?", &choices(&["1", "2"]));
        assert!(out.contains("### ANSWER: X"));
        assert!(out.ends_with("SUY LUẬN:"));
    }
}
