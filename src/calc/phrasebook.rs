//! Display wording for findings. The rules that decide *whether* something is worth saying live in
//! `insights`; this module only decides how it reads.

use super::insights::Finding;

pub struct Phrase {
    pub title: String,
    pub description: String,
    pub action_label: Option<String>,
}

fn phrase(title: String, description: String) -> Phrase {
    Phrase {
        title,
        description,
        action_label: None,
    }
}

pub fn describe(finding: &Finding) -> Phrase {
    match finding {
        Finding::CriticalStudents { count, percent } => Phrase {
            action_label: Some("Ver alunos".into()),
            ..phrase(
                format!("{count} alunos em situação crítica"),
                format!(
                    "{percent:.0}% dos alunos estão reprovados em 3 ou mais disciplinas e precisam de intervenção imediata."
                ),
            )
        },
        Finding::ClassCritical {
            class_name,
            percent,
            ..
        } => Phrase {
            action_label: Some("Ver turma".into()),
            ..phrase(
                format!("{class_name} precisa de atenção"),
                format!("{percent:.0}% dos alunos desta turma estão em situação crítica."),
            )
        },
        Finding::HighRiskPredictions { count } => phrase(
            format!("{count} alunos com alto risco de reprovação"),
            "A projeção de média final indica risco alto para estes alunos.".into(),
        ),
        Finding::InsufficientPredictionData { count } => phrase(
            format!("{count} alunos sem dados suficientes para previsão"),
            "São necessários pelo menos 2 bimestres com notas para projetar a média final.".into(),
        ),
        Finding::WorstSubject {
            subject,
            below_percent,
            average,
        } => phrase(
            format!("{subject} é a disciplina mais crítica"),
            format!("{below_percent:.0}% das notas estão abaixo de 6.0 (média: {average:.1})."),
        ),
        Finding::ExcellenceStudents { count, percent } => Phrase {
            action_label: Some("Ver alunos".into()),
            ..phrase(
                format!("{count} alunos de excelência"),
                format!("{percent:.0}% dos alunos têm média geral acima de 8.0 em todas as disciplinas."),
            )
        },
        Finding::LowFrequency { frequency } => phrase(
            "Frequência abaixo do esperado".into(),
            format!("A frequência média é de {frequency:.0}%, abaixo dos 80% recomendados."),
        ),
        Finding::BestClass {
            class_name,
            average,
            excellence,
        } => phrase(
            format!("{class_name} lidera o ranking"),
            format!("Média de {average:.1} e {excellence} alunos de excelência."),
        ),
        Finding::BestGrowth { class_name, growth } => phrase(
            format!("{class_name} teve maior crescimento"),
            format!("Evolução de {growth:.1} pontos em relação ao bimestre anterior com notas."),
        ),
        Finding::WorstGrowth { class_name, growth } => phrase(
            format!("{class_name} apresentou queda de desempenho"),
            format!(
                "Queda de {:.1} ponto(s) em relação ao bimestre anterior com notas.",
                growth.abs()
            ),
        ),
        Finding::HighIncidents { per_student } => phrase(
            "Alto índice de ocorrências".into(),
            format!("Média de {per_student:.1} ocorrências por aluno. Considere ações preventivas."),
        ),
        Finding::SevereIncidents { grave, gravissima } => phrase(
            format!("{} ocorrências graves", grave + gravissima),
            format!(
                "Há {grave} ocorrências graves e {gravissima} gravíssimas que requerem atenção especial."
            ),
        ),
        Finding::SeveritySpike {
            month,
            current,
            previous,
        } => phrase(
            format!("Aumento de ocorrências graves em {month}"),
            format!("{current} ocorrências graves no mês, contra {previous} no mês anterior."),
        ),
        Finding::PendingIncidents { count } => phrase(
            format!("{count} ocorrências pendentes"),
            "Existem ocorrências aguardando resolução. Considere revisar e dar encaminhamento."
                .into(),
        ),
        Finding::ClassMostIncidents {
            class_name,
            count,
            per_student,
        } => phrase(
            format!("{class_name} lidera em ocorrências"),
            format!("{count} ocorrências registradas ({per_student:.1} por aluno)."),
        ),
        Finding::BehaviorImprovement { reduction_percent } => phrase(
            "Melhoria no comportamento".into(),
            format!("Ocorrências reduziram {reduction_percent:.0}% em relação ao mês anterior."),
        ),
    }
}
