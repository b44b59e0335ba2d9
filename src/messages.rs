//! Reply template generation
//!
//! All user-facing copy lives here, in Spanish, with a randomized
//! greeting opening so repeated conversations do not read as templated.
//! The transport's simple emphasis markup (`*bold*`, backticks) is used
//! directly.

use crate::config::{GREETING_KEYWORDS, SALUDOS};
use crate::timing::pick;

/// Whether an inbound text is a conversation-starting greeting.
///
/// Case-insensitive; matches on equality or substring against the fixed
/// keyword list.
#[must_use]
pub fn is_greeting(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    GREETING_KEYWORDS
        .iter()
        .any(|keyword| normalized == *keyword || normalized.contains(keyword))
}

/// Welcome and instructions shown on a greeting or at restart
#[must_use]
pub fn initial_message() -> String {
    let saludo = pick(SALUDOS);

    format!(
        "{saludo} Bienvenido al sistema de reportes ciudadanos.\n\n\
         📝 Para registrar tu reporte, necesito que me cuentes:\n\n\
         *¿Qué problema quieres reportar?*\n\n\
         Por favor, descríbeme la situación con el mayor detalle posible.\n\n\
         💡 Ejemplo:\n\
         ```\nHay un bache grande en la esquina de la Av. América\n```"
    )
}

/// Ask for the report location after the description was accepted
#[must_use]
pub fn location_request() -> String {
    "📍 Perfecto. Ahora necesito saber la ubicación del problema.\n\n\
     Por favor, *comparte tu ubicación* usando el botón de adjuntar (📎) → Ubicación.\n\n\
     💡 Puedes enviar:\n\
     • Tu ubicación actual (si estás en el lugar)\n\
     • La ubicación exacta del problema en el mapa"
        .to_string()
}

/// Ask for a photo after coordinates were stored
#[must_use]
pub fn photo_request() -> String {
    "📷 Excelente. Por último, necesito una foto del problema.\n\n\
     Por favor, envía una *foto* que muestre claramente la situación.\n\n\
     💡 Consejo: Toma una foto clara y bien iluminada del problema."
        .to_string()
}

/// Confirmation carrying the persisted report identifier
#[must_use]
pub fn success(report_id: &str) -> String {
    format!(
        "✅ *¡Reporte registrado exitosamente!*\n\n\
         📋 ID del reporte: `{report_id}`\n\n\
         Tu reporte ha sido enviado al sistema municipal y será atendido \
         a la brevedad posible.\n\n\
         ¡Gracias por contribuir a mejorar nuestra ciudad! 🏙️\n\n\
         ---\n\
         Si deseas hacer otro reporte, simplemente escribe \"hola\" para comenzar de nuevo."
    )
}

/// Generic failure notice; the session is reset, so the user starts over
#[must_use]
pub fn submission_error() -> String {
    "❌ *Hubo un problema al registrar tu reporte.*\n\n\
     Por favor, intenta nuevamente escribiendo \"hola\" para reiniciar el proceso.\n\n\
     Si el problema persiste, contacta con soporte técnico."
        .to_string()
}

/// Rejection notice for descriptions the classifier turned down
#[must_use]
pub fn invalid_report(reason: Option<&str>) -> String {
    let detail = reason.map_or(String::new(), |r| format!("\n\n📝 {r}"));
    format!(
        "🤔 Lo siento, solo puedo registrar reportes de *baches* en calles y avenidas.{detail}\n\n\
         Si tu reporte es sobre un bache, descríbelo nuevamente con más detalle."
    )
}

/// Re-prompt when a location message carried no coordinates
#[must_use]
pub fn missing_location() -> String {
    "❌ No recibí tu ubicación. Por favor, usa el botón de adjuntar (📎) → \
     Ubicación para compartir tu ubicación."
        .to_string()
}

/// Re-prompt when a photo message carried no attachment
#[must_use]
pub fn missing_photo() -> String {
    "❌ No recibí ninguna foto. Por favor, envía una imagen del problema.".to_string()
}

/// Re-prompt when the attachment was not an image
#[must_use]
pub fn not_an_image() -> String {
    "❌ El archivo no es una imagen válida. Por favor, envía una foto.".to_string()
}

/// Polite wait notice for a sender over the hourly cap
#[must_use]
pub fn rate_limited() -> String {
    "Por favor, espera unos minutos antes de enviar otro mensaje. \
     Gracias por tu comprensión. 🙏"
        .to_string()
}

/// Combined greeting + welcome used by the unknown-state recovery path
#[must_use]
pub fn restart() -> String {
    format!("{} {}", pick(SALUDOS), initial_message())
}

/// Apology for an unexpected internal error; the session was reset
#[must_use]
pub fn internal_error() -> String {
    "Disculpa, tuve un problema procesando tu mensaje. Por favor, intenta \
     nuevamente escribiendo \"hola\" para reiniciar."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_detection_case_insensitive() {
        assert!(is_greeting("hola"));
        assert!(is_greeting("Buenos Dias"));
        assert!(is_greeting("  MENÚ  "));
        assert!(is_greeting("hola, quiero reportar algo"));
    }

    #[test]
    fn test_description_is_not_greeting() {
        assert!(!is_greeting("tengo un bache enorme en la avenida"));
        assert!(!is_greeting(""));
    }

    #[test]
    fn test_initial_message_uses_greeting_pool() {
        let msg = initial_message();
        assert!(SALUDOS.iter().any(|s| msg.starts_with(s)));
        assert!(msg.contains("reportes ciudadanos"));
    }

    #[test]
    fn test_success_contains_report_id() {
        assert!(success("42").contains("42"));
    }

    #[test]
    fn test_invalid_report_includes_reason_when_present() {
        let with_reason = invalid_report(Some("No es un problema de pavimento"));
        assert!(with_reason.contains("No es un problema de pavimento"));

        let without = invalid_report(None);
        assert!(without.contains("baches"));
    }
}
