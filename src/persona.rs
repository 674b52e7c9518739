//! The fixed roster of chat characters.
//!
//! Each persona carries the greeting shown before the first reply and a set
//! of sample reply lines in the character's voice. Which
//! characters a user may talk to depends on their latest drawing-test
//! outcome.

#[cfg(test)]
#[path = "persona_test.rs"]
mod tests;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::net::types::CharacterId;

/// Shown when no character is selected or an id is unknown.
pub const DEFAULT_PERSONA_ID: CharacterId = 3;

/// Test outcome that restricts chat to its own persona.
const RESTRICTING_OUTCOME: &str = "슬픔이";
/// Offered for every other outcome.
const STANDARD_IDS: [CharacterId; 4] = [1, 2, 3, 4];

#[derive(Debug, PartialEq, Eq)]
pub struct Persona {
    pub id: CharacterId,
    pub name: &'static str,
    pub description: &'static str,
    pub avatar: &'static str,
    pub opening_lines: &'static [&'static str],
    pub reply_lines: &'static [&'static str],
}

impl Persona {
    pub fn opening_line<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.opening_lines.choose(rng).copied().unwrap_or_default()
    }

    pub fn reply_line<R: Rng + ?Sized>(&self, rng: &mut R) -> &'static str {
        self.reply_lines.choose(rng).copied().unwrap_or_default()
    }
}

const WORRY_OPENINGS: &[&str] = &[
    "걱정되는 일이 있어? 천천히 말해봐",
    "무서운 게 있다면 함께 해결해보자",
    "불안하지? 괜찮아, 내가 옆에 있어",
    "두려운 마음, 충분히 이해해... 어떤 기분이야?",
];

const WORRY_REPLIES: &[&str] = &[
    "걱정이 많으시겠어요... 불안하셨죠?",
    "그런 상황이면 무섭기도 하고 걱정되기도 했을 거예요",
    "혼자 감당하기 어려웠을 것 같아요... 괜찮으세요?",
    "두려운 마음 충분히 이해해요... 어떤 기분이었나요?",
    "그럴 때는 정말 불안하죠... 지금은 어떠세요?",
    "마음이 편하지 않으셨을 거예요... 함께 이야기해요",
    "걱정이 클 때는 정말 힘들죠... 더 말해주세요",
];

static ROSTER: [Persona; 6] = [
    Persona {
        id: 1,
        name: "기쁨이",
        description: "긍정적 생각 전환, 스트레스 해소, 자존감 향상 등을 통해 당신의 마음속 행복을 찾아줄 거예요.",
        avatar: "😊",
        opening_lines: &[
            "안녕! 오늘 뭔가 좋은 일이 있을 것 같은데?",
            "하이~ 기분 좋은 하루 보내고 있어?",
            "웃어봐! 세상이 더 밝아 보일 거야!",
            "오늘은 특별한 날이야. 뭔가 신나는 일을 해볼까?",
        ],
        reply_lines: &[
            "와! 정말 좋은 이야기네요! 더 들어보고 싶어요!",
            "그런 일이 있었군요! 기분이 어떠셨나요?",
            "정말 흥미로워요! 그래서 어떻게 되었나요?",
            "오~ 그런 경험을 하셨군요! 저도 함께 기뻐해요!",
            "멋진 일이네요! 그때 기분을 더 자세히 말해주세요!",
            "우와! 듣기만 해도 기분이 좋아져요!",
            "정말 좋은 경험이었겠어요! 다른 이야기도 있나요?",
        ],
    },
    Persona {
        id: 2,
        name: "버럭이",
        description: "분노 조절과 감정 관리에 대한 조언을 제공합니다.",
        avatar: "😤",
        opening_lines: &[
            "뭐가 그렇게 짜증나는 거야? 말해봐!",
            "화났어? 속시원하게 털어놔!",
            "답답한 게 있으면 다 말해! 내가 들어줄게!",
            "억울한 일이라도 있었나? 화내도 괜찮아!",
        ],
        reply_lines: &[
            "진짜 화나는 일이었겠네! 나도 같이 화나!",
            "그런 건 당연히 짜증날 만해! 더 말해봐!",
            "아, 정말 답답했겠다! 그래서 어떻게 했어?",
            "말도 안 되는 일이네! 정말 화가 치밀어 올라!",
            "그런 상황이면 누구라도 화날 거야! 속 터져!",
            "정말 이해 안 가는 상황이다! 더 털어놔!",
            "그런 일로 스트레스받지 마! 다 말해봐!",
        ],
    },
    Persona {
        id: 3,
        name: "슬픔이",
        description: "당신의 슬픔을 이해하고 함께 극복해나가는 방법을 찾아드립니다.",
        avatar: "😢",
        opening_lines: &[
            "안녕... 무엇이 너를 가장 슬프게 하니...?",
            "힘든 하루였나? 천천히 말해줘...",
            "슬픈 일이 있었구나... 함께 이야기해보자",
            "괜찮아... 여기서는 마음껏 울어도 돼",
        ],
        reply_lines: &[
            "정말 힘들었겠어요... 괜찮으시나요?",
            "그런 일이 있었군요... 많이 슬프셨을 것 같아요",
            "마음이 아프네요... 혼자 견디기 힘들었죠?",
            "이해해요... 그럴 때는 정말 외롭죠",
            "정말 안타까워요... 지금은 어떤 기분이세요?",
            "힘든 시간을 보내셨군요... 함께 이야기해요",
            "그런 마음 충분히 이해해요... 더 말해주세요",
        ],
    },
    Persona {
        id: 4,
        name: "두려움이",
        description: "불안과 두려움을 다스리는 방법을 알려드립니다.",
        avatar: "😱",
        opening_lines: WORRY_OPENINGS,
        reply_lines: WORRY_REPLIES,
    },
    Persona {
        id: 5,
        name: "무서미",
        description: "불안과 두려움을 극복하는 방법을 함께 찾아보아요. 작은 용기부터 시작해 정서적 자신감을 키워나가요.",
        avatar: "😰",
        opening_lines: WORRY_OPENINGS,
        reply_lines: WORRY_REPLIES,
    },
    Persona {
        id: 6,
        name: "까칠이",
        description: "솔직하고 직설적인 조언으로 현실적인 해결책을 제시해드려요. 때로는 쓴소리도 필요하니까요.",
        avatar: "😑",
        opening_lines: &[
            "뭔 일이야? 솔직히 말해봐",
            "또 무슨 일로 고민이야? 현실적으로 생각해보자",
            "쓸데없는 걱정 말고, 정확히 뭐가 문제인지 말해",
            "그만 우울해하고, 뭐가 진짜 문제인지 파악해보자",
        ],
        reply_lines: &[
            "그래서 결론이 뭐야? 정확히 말해봐",
            "솔직히 말하면, 그건 당연한 결과 아니야?",
            "뭘 기대했던 거야? 현실적으로 생각해봐",
            "그런 식으로 하면 당연히 그렇게 되지",
            "정신 차리고 제대로 접근해야지",
            "감정적으로 생각하지 말고 논리적으로 판단해",
            "그래서 이제 어떻게 할 계획이야?",
        ],
    },
];

#[must_use]
pub fn roster() -> &'static [Persona] {
    &ROSTER
}

#[must_use]
pub fn find(id: CharacterId) -> Option<&'static Persona> {
    ROSTER.iter().find(|p| p.id == id)
}

#[must_use]
pub fn find_by_name(name: &str) -> Option<&'static Persona> {
    ROSTER.iter().find(|p| p.name == name)
}

/// The persona for `id`, or the default one when `id` is unknown.
#[must_use]
pub fn find_or_default(id: CharacterId) -> &'static Persona {
    find(id).unwrap_or(&ROSTER[2])
}

/// Characters the user may chat with given their latest test outcome
/// (the outcome persona's name, as reported in test results).
#[must_use]
pub fn available_for(outcome: Option<&str>) -> Vec<&'static Persona> {
    if outcome.map(str::trim) == Some(RESTRICTING_OUTCOME) {
        return find_by_name(RESTRICTING_OUTCOME).into_iter().collect();
    }
    STANDARD_IDS.iter().filter_map(|id| find(*id)).collect()
}

/// Pick a greeting for a new conversation with `id`.
#[must_use]
pub fn pick_opening_line(id: CharacterId) -> String {
    find_or_default(id).opening_line(&mut rand::rng()).to_owned()
}
